//! The algebra over [`DataType`]: assignability, comparability, and the
//! lattice combinators used to join branches and merge narrowing facts.

use crate::error::TypeError;
use crate::ty::{ColumnName, ColumnType, DataType, KnownSet, RowType, SizedKind};

impl DataType {
    /// Covariant assignability check.
    ///
    /// `Unknown` is assignable to and from anything so a single unresolved
    /// reference does not cascade; `Void` is assignable to nothing.
    pub fn is_assignable_to(&self, dest: &DataType) -> Result<(), TypeError> {
        if matches!(self, DataType::Unknown) || matches!(dest, DataType::Unknown) {
            return Ok(());
        }
        match (self, dest) {
            (DataType::Void, _) | (_, DataType::Void) => Err(not_assignable(self, dest)),
            (DataType::Function(_) | DataType::Procedure(_), _)
            | (_, DataType::Function(_) | DataType::Procedure(_)) => {
                Err(not_assignable(self, dest))
            }
            (DataType::Column(src), DataType::Column(dst)) => {
                column_name_assignable(&src.name, &dst.name)?;
                src.ty.is_assignable_to(&dst.ty)
            }
            (DataType::Column(src), _) => src.ty.is_assignable_to(dest),
            (_, DataType::Column(dst)) => self.is_assignable_to(&dst.ty),
            (DataType::Row(src), DataType::Row(dst)) => {
                if src.is_unknown_shape() || dst.is_unknown_shape() {
                    return Ok(());
                }
                if src.columns.len() != dst.columns.len() {
                    return Err(TypeError::ColumnCountMismatch {
                        source_count: src.columns.len(),
                        dest_count: dst.columns.len(),
                    });
                }
                for (position, (sc, dc)) in src.columns.iter().zip(&dst.columns).enumerate() {
                    column_name_assignable(&sc.name, &dc.name)
                        .and_then(|_| sc.ty.is_assignable_to(&dc.ty))
                        .map_err(|inner| TypeError::ColumnError {
                            position: position + 1,
                            inner: Box::new(inner),
                        })?;
                }
                Ok(())
            }
            (DataType::Row(_), _) | (_, DataType::Row(_)) => Err(not_assignable(self, dest)),
            (DataType::Null, DataType::Null | DataType::Nullable(_)) => Ok(()),
            (DataType::Null, _) => Err(TypeError::NullAssignment {
                source_type: self.to_string(),
                dest_type: dest.to_string(),
            }),
            (DataType::Nullable(inner), DataType::Nullable(dst)) => inner.is_assignable_to(dst),
            (DataType::Nullable(_), DataType::Null) => Ok(()),
            (DataType::Nullable(_), _) => Err(TypeError::NullAssignment {
                source_type: self.to_string(),
                dest_type: dest.to_string(),
            }),
            (_, DataType::Nullable(dst)) => self.is_assignable_to(dst),
            (_, DataType::Null) => Ok(()),
            (
                DataType::Domain {
                    base: src_base,
                    name: src_name,
                },
                DataType::Domain {
                    base: dst_base,
                    name: dst_name,
                },
            ) => {
                src_base.is_assignable_to(dst_base)?;
                if src_name.eq_ignore_ascii_case(dst_name) {
                    Ok(())
                } else {
                    Err(TypeError::DomainMismatch {
                        source_domain: src_name.clone(),
                        dest_domain: dst_name.clone(),
                    })
                }
            }
            // A domain is never compatible with a known set.
            (DataType::Domain { .. }, DataType::KnownSet(_))
            | (DataType::KnownSet(_), DataType::Domain { .. }) => Err(not_assignable(self, dest)),
            (DataType::Domain { base, .. }, _) => base.is_assignable_to(dest),
            (_, DataType::Domain { .. }) => Err(not_assignable(self, dest)),
            (DataType::KnownSet(src), DataType::KnownSet(dst)) => {
                if !same_scalar_family(&src.base, &dst.base) {
                    return Err(not_assignable(self, dest));
                }
                let holds = match (src.include, dst.include) {
                    (true, true) => src.values.is_subset(&dst.values),
                    (true, false) => src.values.is_disjoint(&dst.values),
                    (false, true) => dst.values.is_disjoint(&src.values),
                    (false, false) => dst.values.is_subset(&src.values),
                };
                if holds {
                    Ok(())
                } else {
                    Err(TypeError::KnownSetViolation {
                        source_type: self.to_string(),
                        dest_type: dest.to_string(),
                    })
                }
            }
            (DataType::KnownSet(src), _) => src.base.is_assignable_to(dest),
            (_, DataType::KnownSet(_)) => Err(TypeError::KnownSetViolation {
                source_type: self.to_string(),
                dest_type: dest.to_string(),
            }),
            (
                DataType::Sized {
                    kind: src_kind,
                    max_len: src_len,
                },
                DataType::Sized {
                    kind: dst_kind,
                    max_len: dst_len,
                },
            ) => {
                // An nvarchar can hold the representation of a varchar, not
                // the other way around.
                let kind_ok = src_kind == dst_kind
                    || (*src_kind == SizedKind::VarChar && *dst_kind == SizedKind::NVarChar);
                if !kind_ok {
                    return Err(not_assignable(self, dest));
                }
                if src_len <= dst_len {
                    Ok(())
                } else {
                    Err(TypeError::SizeMismatch {
                        source_type: self.to_string(),
                        dest_type: dest.to_string(),
                    })
                }
            }
            (DataType::Scalar(src), DataType::Scalar(dst)) if src == dst => Ok(()),
            _ => Err(not_assignable(self, dest)),
        }
    }

    /// True when either direction of assignability holds; decorators defer
    /// to their wrapped base when compared against a non-decorated peer.
    pub fn can_compare_with(&self, other: &DataType) -> Result<(), TypeError> {
        match (self, other) {
            (DataType::Unknown, _) | (_, DataType::Unknown) => Ok(()),
            (DataType::Column(col), _) => col.ty.can_compare_with(other),
            (_, DataType::Column(col)) => self.can_compare_with(&col.ty),
            (DataType::KnownSet(set), _) if !matches!(other, DataType::KnownSet(_)) => {
                set.base.can_compare_with(other)
            }
            (_, DataType::KnownSet(set)) if !matches!(self, DataType::KnownSet(_)) => {
                self.can_compare_with(&set.base)
            }
            (DataType::Domain { base, .. }, _) if !matches!(other, DataType::Domain { .. }) => {
                base.can_compare_with(other)
            }
            (_, DataType::Domain { base, .. }) if !matches!(self, DataType::Domain { .. }) => {
                self.can_compare_with(base)
            }
            _ => match self.is_assignable_to(other) {
                Ok(()) => Ok(()),
                Err(first) => match other.is_assignable_to(self) {
                    Ok(()) => Ok(()),
                    Err(_) => Err(TypeError::NotComparable {
                        left: self.to_string(),
                        right: other.to_string(),
                        cause: Box::new(first),
                    }),
                },
            },
        }
    }

    /// "Could be either": the join used for branch results and set
    /// operations. `None` means the two types have no common supertype worth
    /// reporting, which is a real type error upstream.
    pub fn disjunction(a: &DataType, b: &DataType) -> Option<DataType> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (DataType::Unknown, _) | (_, DataType::Unknown) => Some(DataType::Unknown),
            (DataType::Void, _) | (_, DataType::Void) => None,
            (DataType::Column(ca), DataType::Column(cb)) if ca.name.matches(&cb.name) => {
                Self::disjunction(&ca.ty, &cb.ty).map(|ty| {
                    DataType::Column(Box::new(ColumnType {
                        name: ca.name.clone(),
                        ty,
                        defining_span: ca.defining_span.or(cb.defining_span),
                    }))
                })
            }
            (DataType::Column(ca), DataType::Column(cb)) => {
                Self::disjunction(&ca.ty, &cb.ty).map(anonymous_column)
            }
            (DataType::Column(ca), _) => Self::disjunction(&ca.ty, b).map(anonymous_column),
            (_, DataType::Column(cb)) => Self::disjunction(a, &cb.ty).map(anonymous_column),
            (DataType::Row(ra), DataType::Row(rb)) => {
                if ra.is_unknown_shape() {
                    return Some(b.clone());
                }
                if rb.is_unknown_shape() {
                    return Some(a.clone());
                }
                if ra.columns.len() != rb.columns.len() {
                    return None;
                }
                let mut columns = Vec::with_capacity(ra.columns.len());
                for (ca, cb) in ra.columns.iter().zip(&rb.columns) {
                    columns.push(ca.join(cb)?);
                }
                Some(DataType::Row(RowType::new(columns)))
            }
            (DataType::Row(_), _) | (_, DataType::Row(_)) => None,
            (DataType::KnownSet(x), DataType::KnownSet(y))
                if x.include && y.include && same_scalar_family(&x.base, &y.base) =>
            {
                Some(DataType::KnownSet(KnownSet {
                    base: Box::new(wider(&x.base, &y.base).clone()),
                    include: true,
                    values: x.values.union(&y.values).cloned().collect(),
                }))
            }
            (DataType::Null, t) | (t, DataType::Null) => Some(t.clone().to_nullable()),
            (DataType::Nullable(x), DataType::Nullable(y)) => {
                Self::disjunction(x, y).map(DataType::to_nullable)
            }
            (DataType::Nullable(x), t) => Self::disjunction(x, t).map(DataType::to_nullable),
            (t, DataType::Nullable(y)) => Self::disjunction(t, y).map(DataType::to_nullable),
            _ => {
                let core_a = strip_decorators(a);
                let core_b = strip_decorators(b);
                if same_scalar_family(core_a, core_b) {
                    Some(wider(core_a, core_b).clone())
                } else {
                    None
                }
            }
        }
    }

    /// "Both facts hold": defined for two exclusion sets of matching base,
    /// whose excluded values union. Anything else is indecision.
    pub fn conjunction(a: &DataType, b: &DataType) -> Option<DataType> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (DataType::KnownSet(x), DataType::KnownSet(y))
                if !x.include && !y.include && same_scalar_family(&x.base, &y.base) =>
            {
                Some(DataType::KnownSet(KnownSet {
                    base: x.base.clone(),
                    include: false,
                    values: x.values.union(&y.values).cloned().collect(),
                }))
            }
            _ => None,
        }
    }

    /// The negation of [`DataType::conjunction`] over the same operands:
    /// "not (none of X and none of Y)" collapses to "one of X union Y".
    pub fn negation_of_conjunction(a: &DataType, b: &DataType) -> Option<DataType> {
        match (a, b) {
            (DataType::KnownSet(x), DataType::KnownSet(y))
                if !x.include && !y.include && same_scalar_family(&x.base, &y.base) =>
            {
                Some(DataType::KnownSet(KnownSet {
                    base: x.base.clone(),
                    include: true,
                    values: x.values.union(&y.values).cloned().collect(),
                }))
            }
            _ => None,
        }
    }

    /// What remains of `a` once `b` is ruled out.
    ///
    /// Ruling out a non-null value that actually changed the inner type also
    /// discharges the nullable wrapper; ruling out `Null` alone unwraps it.
    pub fn subtract(a: &DataType, b: &DataType) -> DataType {
        match (a, b) {
            (DataType::Nullable(inner), DataType::Null) => (**inner).clone(),
            (DataType::Nullable(inner), _) => {
                let reduced = Self::subtract(inner, b);
                if &reduced != inner.as_ref() {
                    reduced
                } else {
                    a.clone()
                }
            }
            (DataType::KnownSet(x), DataType::KnownSet(y))
                if same_scalar_family(&x.base, &y.base) =>
            {
                let (include, values) = match (x.include, y.include) {
                    (true, true) => (true, x.values.difference(&y.values).cloned().collect()),
                    (true, false) => (true, x.values.union(&y.values).cloned().collect()),
                    (false, _) => (false, x.values.union(&y.values).cloned().collect()),
                };
                DataType::KnownSet(KnownSet {
                    base: x.base.clone(),
                    include,
                    values,
                })
            }
            (DataType::Scalar(_) | DataType::Sized { .. }, DataType::KnownSet(y))
                if same_scalar_family(a, &y.base) =>
            {
                DataType::KnownSet(y.invert())
            }
            _ => a.clone(),
        }
    }

    /// How a narrowing fact rewrites a previously known type: an inclusion
    /// set (or any non-set type) replaces it outright, an exclusion set
    /// subtracts its inverse.
    pub fn refine(new: &DataType, previous: &DataType) -> DataType {
        match new {
            DataType::KnownSet(set) if !set.include => {
                Self::subtract(previous, &DataType::KnownSet(set.invert()))
            }
            _ => new.clone(),
        }
    }
}

impl ColumnType {
    /// Join two columns for a set operation or branch merge: types join by
    /// disjunction, and whichever side carries a user alias names the result.
    pub fn join(&self, other: &ColumnType) -> Option<ColumnType> {
        let ty = DataType::disjunction(&self.ty, &other.ty)?;
        let name = if self.name.is_aliased() {
            self.name.clone()
        } else if other.name.is_aliased() {
            other.name.clone()
        } else if self.name.text().is_some() {
            self.name.clone()
        } else if other.name.text().is_some() {
            other.name.clone()
        } else {
            ColumnName::Anonymous
        };
        Some(ColumnType {
            name,
            ty,
            defining_span: self.defining_span.or(other.defining_span),
        })
    }
}

fn anonymous_column(ty: DataType) -> DataType {
    DataType::Column(Box::new(ColumnType::new(ColumnName::Anonymous, ty)))
}

fn not_assignable(src: &DataType, dest: &DataType) -> TypeError {
    TypeError::NotAssignable {
        source_type: src.to_string(),
        dest_type: dest.to_string(),
    }
}

fn column_name_assignable(src: &ColumnName, dest: &ColumnName) -> Result<(), TypeError> {
    match src {
        ColumnName::Aliased(name) => match dest.text() {
            Some(dest_name) if name.eq_ignore_ascii_case(dest_name) => Ok(()),
            Some(dest_name) => Err(TypeError::ColumnNameMismatch {
                source_name: name.clone(),
                dest_name: dest_name.to_string(),
            }),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Same underlying kind, ignoring character lengths.
fn same_scalar_family(a: &DataType, b: &DataType) -> bool {
    match (a, b) {
        (DataType::Scalar(x), DataType::Scalar(y)) => x == y,
        (DataType::Sized { kind: x, .. }, DataType::Sized { kind: y, .. }) => x == y,
        _ => false,
    }
}

fn wider<'a>(a: &'a DataType, b: &'a DataType) -> &'a DataType {
    if b.size_of_domain() > a.size_of_domain() {
        b
    } else {
        a
    }
}

fn strip_decorators(t: &DataType) -> &DataType {
    let mut current = t;
    loop {
        match current {
            DataType::KnownSet(set) => current = &set.base,
            DataType::Domain { base, .. } => current = base,
            _ => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;

    fn excl_ints<I: IntoIterator<Item = i64>>(values: I) -> DataType {
        DataType::KnownSet(KnownSet::new(
            DataType::int(),
            false,
            values.into_iter().map(SqlValue::Int).collect(),
        ))
    }

    fn domain(name: &str) -> DataType {
        DataType::Domain {
            base: Box::new(DataType::int()),
            name: name.to_string(),
        }
    }

    fn samples() -> Vec<DataType> {
        vec![
            DataType::int(),
            DataType::varchar(10),
            DataType::nvarchar(20),
            DataType::int().to_nullable(),
            DataType::int_values([1, 2]),
            excl_ints([0]),
            domain("dbo.Master.id"),
            DataType::Null,
            DataType::Unknown,
        ]
    }

    #[test]
    fn assignability_is_reflexive() {
        for t in samples() {
            assert!(t.is_assignable_to(&t).is_ok(), "{} to itself", t);
        }
    }

    #[test]
    fn inclusion_sets_are_directional() {
        let small = DataType::int_values([1, 2]);
        let large = DataType::int_values([1, 2, 3]);
        assert!(small.is_assignable_to(&large).is_ok());
        assert!(large.is_assignable_to(&small).is_err());
    }

    #[test]
    fn inclusion_into_exclusion_requires_disjoint_values() {
        let ones = DataType::int_values([1, 2]);
        assert!(ones.is_assignable_to(&excl_ints([5, 6])).is_ok());
        assert!(ones.is_assignable_to(&excl_ints([2])).is_err());
    }

    #[test]
    fn exclusion_into_exclusion_requires_covering() {
        let wide = excl_ints([0, 1]);
        assert!(wide.is_assignable_to(&excl_ints([0])).is_ok());
        assert!(excl_ints([0]).is_assignable_to(&excl_ints([0, 1])).is_err());
    }

    #[test]
    fn plain_scalar_never_enters_a_set_or_domain() {
        assert!(DataType::int()
            .is_assignable_to(&DataType::int_values([1]))
            .is_err());
        assert!(DataType::int().is_assignable_to(&domain("d")).is_err());
    }

    #[test]
    fn varchar_fits_into_nvarchar_one_way() {
        assert!(DataType::varchar(5)
            .is_assignable_to(&DataType::nvarchar(5))
            .is_ok());
        assert!(DataType::nvarchar(5)
            .is_assignable_to(&DataType::varchar(5))
            .is_err());
    }

    #[test]
    fn sized_respects_length() {
        assert!(DataType::varchar(5)
            .is_assignable_to(&DataType::varchar(10))
            .is_ok());
        assert!(DataType::varchar(10)
            .is_assignable_to(&DataType::varchar(5))
            .is_err());
    }

    #[test]
    fn null_flows_only_into_nullable() {
        assert!(DataType::Null
            .is_assignable_to(&DataType::int().to_nullable())
            .is_ok());
        assert!(DataType::Null.is_assignable_to(&DataType::int()).is_err());
        assert!(DataType::int()
            .to_nullable()
            .is_assignable_to(&DataType::int())
            .is_err());
        assert!(DataType::int()
            .is_assignable_to(&DataType::int().to_nullable())
            .is_ok());
    }

    #[test]
    fn domains_are_nominal() {
        assert!(domain("a.b").is_assignable_to(&domain("A.B")).is_ok());
        assert!(domain("a.b").is_assignable_to(&domain("a.c")).is_err());
    }

    #[test]
    fn rows_check_counts_and_columns() {
        let pair = DataType::Row(RowType::new(vec![
            ColumnType::new(ColumnName::Schema("id".to_string()), DataType::int()),
            ColumnType::new(ColumnName::Anonymous, DataType::varchar(5)),
        ]));
        let single = DataType::Row(RowType::new(vec![ColumnType::new(
            ColumnName::Anonymous,
            DataType::int(),
        )]));
        assert!(pair.is_assignable_to(&pair).is_ok());
        assert!(pair.is_assignable_to(&single).is_err());
        assert!(pair
            .is_assignable_to(&DataType::Row(RowType::unknown_shape()))
            .is_ok());
    }

    #[test]
    fn aliased_column_names_must_agree() {
        let src = DataType::Column(Box::new(ColumnType::new(
            ColumnName::Aliased("total".to_string()),
            DataType::int(),
        )));
        let named = DataType::Column(Box::new(ColumnType::new(
            ColumnName::Schema("amount".to_string()),
            DataType::int(),
        )));
        assert!(src.is_assignable_to(&named).is_err());
        let matching = DataType::Column(Box::new(ColumnType::new(
            ColumnName::Schema("Total".to_string()),
            DataType::int(),
        )));
        assert!(src.is_assignable_to(&matching).is_ok());
    }

    #[test]
    fn disjunction_is_commutative_and_covers_both_inputs() {
        let values = samples();
        for a in &values {
            for b in &values {
                let forward = DataType::disjunction(a, b);
                let backward = DataType::disjunction(b, a);
                if let Some(joined) = &forward {
                    assert!(
                        a.is_assignable_to(joined).is_ok(),
                        "{} into {}",
                        a,
                        joined
                    );
                    assert!(
                        b.is_assignable_to(joined).is_ok(),
                        "{} into {}",
                        b,
                        joined
                    );
                }
                match (&forward, &backward) {
                    (Some(f), Some(r)) => {
                        assert_eq!(f.size_of_domain(), r.size_of_domain(), "{} vs {}", a, b)
                    }
                    (None, None) => {}
                    _ => panic!("disjunction not symmetric for {} and {}", a, b),
                }
            }
        }
    }

    #[test]
    fn inclusion_sets_union_and_widen() {
        let apples = DataType::varchar_value("apples");
        let oranges = DataType::varchar_value("oranges");
        let joined = DataType::disjunction(&apples, &oranges).unwrap();
        match joined {
            DataType::KnownSet(set) => {
                assert!(set.include);
                assert_eq!(set.values.len(), 2);
                assert_eq!(*set.base, DataType::varchar(7));
            }
            other => panic!("expected a known set, got {}", other),
        }
    }

    #[test]
    fn exclusion_sets_join_to_the_plain_scalar() {
        let joined = DataType::disjunction(&excl_ints([0]), &excl_ints([1])).unwrap();
        assert_eq!(joined, DataType::int());
    }

    #[test]
    fn null_joins_wrap_nullable() {
        assert_eq!(
            DataType::disjunction(&DataType::Null, &DataType::int()).unwrap(),
            DataType::int().to_nullable()
        );
        let joined = DataType::disjunction(
            &DataType::int_values([1, 2]).to_nullable(),
            &DataType::int_values([3, 4]),
        )
        .unwrap();
        assert_eq!(joined, DataType::int_values([1, 2, 3, 4]).to_nullable());
    }

    #[test]
    fn subtracting_null_from_nullable_round_trips() {
        for t in [DataType::int(), DataType::varchar(3), DataType::int_values([7])] {
            let nullable = t.clone().to_nullable();
            assert_eq!(DataType::subtract(&nullable, &DataType::Null), t);
        }
    }

    #[test]
    fn subtracting_a_set_from_a_scalar_inverts_it() {
        assert_eq!(
            DataType::subtract(&DataType::int(), &excl_ints([0])),
            DataType::int_values([0])
        );
        assert_eq!(
            DataType::subtract(&DataType::int(), &DataType::int_values([0])),
            excl_ints([0])
        );
    }

    #[test]
    fn subtracting_a_value_discharges_nullability() {
        let narrowed = DataType::subtract(
            &DataType::int().to_nullable(),
            &DataType::int_values([0]),
        );
        assert_eq!(narrowed, excl_ints([0]));
    }

    #[test]
    fn conjunction_unions_exclusions() {
        let merged = DataType::conjunction(&excl_ints([0]), &excl_ints([1])).unwrap();
        assert_eq!(merged, excl_ints([0, 1]));
        assert!(DataType::conjunction(&DataType::int_values([1]), &DataType::int_values([2]))
            .is_none());
        let t = DataType::int_values([1, 2]);
        assert_eq!(DataType::conjunction(&t, &t).unwrap(), t);
    }

    #[test]
    fn negation_of_conjunction_collects_the_values() {
        let negated =
            DataType::negation_of_conjunction(&excl_ints([0]), &excl_ints([1])).unwrap();
        assert_eq!(negated, DataType::int_values([0, 1]));
    }

    #[test]
    fn refine_replaces_or_subtracts() {
        let previous = DataType::int().to_nullable();
        assert_eq!(
            DataType::refine(&DataType::int_values([1]), &previous),
            DataType::int_values([1])
        );
        assert_eq!(DataType::refine(&excl_ints([0]), &previous), excl_ints([0]));
    }

    #[test]
    fn comparability_defers_through_decorators() {
        assert!(DataType::int()
            .can_compare_with(&DataType::int().to_nullable())
            .is_ok());
        assert!(DataType::int_values([0])
            .can_compare_with(&DataType::int().to_nullable())
            .is_ok());
        assert!(domain("d")
            .can_compare_with(&DataType::int())
            .is_ok());
        assert!(DataType::int()
            .can_compare_with(&DataType::Scalar(crate::ty::ScalarKind::Date))
            .is_err());
        assert!(DataType::varchar_value("starfruit")
            .can_compare_with(&DataType::varchar_value("apples"))
            .is_err());
    }
}
