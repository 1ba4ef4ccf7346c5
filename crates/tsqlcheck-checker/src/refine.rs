//! The refinement model: facts a boolean expression proves about symbols.
//!
//! Any boolean-typed expression yields a [`RefinementSetCases`] pair
//! describing what is additionally known when the expression is true and
//! when it is false. The combinators here mirror the logical connectives;
//! where a combination is undefined the fact is dropped rather than guessed
//! (indecision loses the claim).

use tsqlcheck_types::DataType;

/// What a refinement narrows: a variable or one column of a row symbol.
///
/// Names are the scope chain's canonical forms; comparison is
/// case-insensitive regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    /// A top-level `@variable`.
    Variable {
        /// Canonical variable name.
        name: String,
    },
    /// One column of a row-typed symbol.
    Column {
        /// Canonical name of the owning symbol.
        table: String,
        /// The column name.
        column: String,
    },
}

impl SymbolRef {
    /// Case-insensitive identity.
    pub fn matches(&self, other: &SymbolRef) -> bool {
        match (self, other) {
            (SymbolRef::Variable { name: a }, SymbolRef::Variable { name: b }) => {
                a.eq_ignore_ascii_case(b)
            }
            (
                SymbolRef::Column {
                    table: ta,
                    column: ca,
                },
                SymbolRef::Column {
                    table: tb,
                    column: cb,
                },
            ) => ta.eq_ignore_ascii_case(tb) && ca.eq_ignore_ascii_case(cb),
            _ => false,
        }
    }
}

/// One narrowing fact: this reference has this type here.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// What is narrowed.
    pub target: SymbolRef,
    /// The narrowed type.
    pub ty: DataType,
}

/// A set of refinements, at most one per reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefinementSet {
    refinements: Vec<Refinement>,
}

impl RefinementSet {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding one fact.
    pub fn single(target: SymbolRef, ty: DataType) -> Self {
        Self {
            refinements: vec![Refinement { target, ty }],
        }
    }

    /// True when nothing is known.
    pub fn is_empty(&self) -> bool {
        self.refinements.is_empty()
    }

    /// Iterate the facts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Refinement> {
        self.refinements.iter()
    }

    /// Insert a fact, replacing any existing fact about the same reference.
    pub fn add(&mut self, refinement: Refinement) {
        match self
            .refinements
            .iter_mut()
            .find(|r| r.target.matches(&refinement.target))
        {
            Some(existing) => *existing = refinement,
            None => self.refinements.push(refinement),
        }
    }

    /// The fact about a reference, if any.
    pub fn get(&self, target: &SymbolRef) -> Option<&Refinement> {
        self.refinements.iter().find(|r| r.target.matches(target))
    }

    /// Join two sets keyed by reference. References present on both sides go
    /// through `inner`; references present on one side go through `outer`.
    /// Either closure may decline, dropping the fact.
    fn join(
        left: &RefinementSet,
        right: &RefinementSet,
        outer: impl Fn(&Refinement) -> Option<Refinement>,
        inner: impl Fn(&SymbolRef, &DataType, &DataType) -> Option<DataType>,
    ) -> RefinementSet {
        let mut joined = RefinementSet::new();
        for l in left.iter() {
            match right.get(&l.target) {
                Some(r) => {
                    if let Some(ty) = inner(&l.target, &l.ty, &r.ty) {
                        joined.add(Refinement {
                            target: l.target.clone(),
                            ty,
                        });
                    }
                }
                None => {
                    if let Some(passed) = outer(l) {
                        joined.add(passed);
                    }
                }
            }
        }
        for r in right.iter() {
            if left.get(&r.target).is_none() {
                if let Some(passed) = outer(r) {
                    joined.add(passed);
                }
            }
        }
        joined
    }

    /// Merge two sets of facts that hold simultaneously: one-sided facts
    /// pass through, matched facts combine via [`DataType::conjunction`].
    pub fn conjunction(left: &RefinementSet, right: &RefinementSet) -> RefinementSet {
        Self::join(
            left,
            right,
            |r| Some(r.clone()),
            |_, a, b| DataType::conjunction(a, b),
        )
    }
}

/// The (if-true, if-false) pair of refinement sets a boolean expression
/// produces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefinementSetCases {
    /// Facts holding when the expression is true.
    pub positive: RefinementSet,
    /// Facts holding when the expression is false.
    pub negative: RefinementSet,
}

impl RefinementSetCases {
    /// No facts either way.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from both sides.
    pub fn new(positive: RefinementSet, negative: RefinementSet) -> Self {
        Self { positive, negative }
    }

    /// Swap positive and negative (a logical NOT).
    pub fn negate(self) -> Self {
        Self {
            positive: self.negative,
            negative: self.positive,
        }
    }

    /// Cases for `left AND right`.
    ///
    /// Positive: both sides hold, so one-sided facts pass through and
    /// matched facts conjoin. Negative: a fact true in only one branch is
    /// not safely usable as part of "not (A and B)", so only matched facts
    /// survive, via [`DataType::negation_of_conjunction`].
    pub fn conjunction(left: &Self, right: &Self) -> Self {
        Self {
            positive: RefinementSet::conjunction(&left.positive, &right.positive),
            negative: RefinementSet::join(
                &left.positive,
                &right.positive,
                |_| None,
                |_, a, b| DataType::negation_of_conjunction(a, b),
            ),
        }
    }

    /// Cases for `left OR right`.
    ///
    /// Positive: only a reference narrowed on both sides is narrowed at all,
    /// to the disjunction of the claims. Negative: De Morgan over matched
    /// known-set claims, inverting the joined set; anything else is dropped.
    pub fn disjunction(left: &Self, right: &Self) -> Self {
        Self {
            positive: RefinementSet::join(
                &left.positive,
                &right.positive,
                |_| None,
                |_, a, b| DataType::disjunction(a, b),
            ),
            negative: RefinementSet::join(
                &left.positive,
                &right.positive,
                |_| None,
                |_, a, b| match DataType::disjunction(a, b) {
                    Some(DataType::KnownSet(set)) => Some(DataType::KnownSet(set.invert())),
                    _ => None,
                },
            ),
        }
    }
}
