//! The lexical scope chain.
//!
//! Frames live in an arena and form a singly-linked chain through parent
//! ids, so control-flow branches can build cheap, independent, discardable
//! child frames over the same ancestry. Narrowing never mutates a parent;
//! it writes a shadowing entry into the child.

use rustc_hash::FxHashMap;

use tsqlcheck_types::{DataType, RowType};

use crate::refine::{Refinement, RefinementSet, SymbolRef};

/// How symbol names are normalized, fixed at the root and inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    /// Names compare exactly.
    Sensitive,
    /// Names are folded to lower case, the SQL Server default.
    Insensitive,
}

impl CaseSensitivity {
    /// The canonical form of a name under this policy.
    pub fn normalize(&self, name: &str) -> String {
        match self {
            CaseSensitivity::Sensitive => name.to_string(),
            CaseSensitivity::Insensitive => name.to_ascii_lowercase(),
        }
    }
}

/// The declared-vs-narrowed typing of one symbol.
///
/// `declared` governs what may be assigned into the symbol; the narrowed
/// expression type, when present, governs what the symbol evaluates to. The
/// split is what makes flow narrowing observable without touching the
/// declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTyping {
    /// The type the symbol was declared with.
    pub declared: DataType,
    /// The flow-narrowed type, if any narrowing applies here.
    pub narrowed: Option<DataType>,
}

impl SymbolTyping {
    /// A symbol with no narrowing.
    pub fn declared(ty: DataType) -> Self {
        Self {
            declared: ty,
            narrowed: None,
        }
    }

    /// A symbol carrying a narrowed expression type.
    pub fn narrowed(declared: DataType, narrowed: DataType) -> Self {
        Self {
            declared,
            narrowed: Some(narrowed),
        }
    }

    /// What the symbol evaluates to when read.
    pub fn expression_type(&self) -> &DataType {
        self.narrowed.as_ref().unwrap_or(&self.declared)
    }
}

/// Index of a frame in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

#[derive(Debug, Default)]
struct FrameData {
    parent: Option<FrameId>,
    symbols: FxHashMap<String, SymbolTyping>,
    /// Simplified name forms (e.g. the unqualified tail of a dotted name)
    /// mapping to the canonical key in `symbols`.
    aliases: FxHashMap<String, String>,
    /// Canonical keys in insertion order, for deterministic row iteration.
    order: Vec<String>,
}

/// The frame arena.
#[derive(Debug)]
pub struct Frames {
    frames: Vec<FrameData>,
    case: CaseSensitivity,
}

impl Frames {
    /// Create an arena holding one root frame.
    pub fn new(case: CaseSensitivity) -> (Frames, FrameId) {
        let frames = Frames {
            frames: vec![FrameData::default()],
            case,
        };
        (frames, FrameId(0))
    }

    /// Push an empty child of `parent`.
    pub fn push_child(&mut self, parent: FrameId) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(FrameData {
            parent: Some(parent),
            ..FrameData::default()
        });
        id
    }

    fn data(&self, id: FrameId) -> &FrameData {
        &self.frames[id.0 as usize]
    }

    fn data_mut(&mut self, id: FrameId) -> &mut FrameData {
        &mut self.frames[id.0 as usize]
    }

    /// The canonical key `name` resolves to within one frame, if any.
    fn resolve_local(&self, frame: FrameId, normalized: &str) -> Option<String> {
        let data = self.data(frame);
        if data.symbols.contains_key(normalized) {
            return Some(normalized.to_string());
        }
        data.aliases.get(normalized).cloned()
    }

    /// Insert a new symbol into `frame`, also registering the unqualified
    /// tail of a dotted name so both forms resolve.
    ///
    /// Panics if the canonical name already exists in this frame; callers
    /// surface user-level redeclarations as diagnostics before inserting.
    pub fn with_symbol(&mut self, frame: FrameId, name: &str, typing: SymbolTyping) {
        let canonical = self.case.normalize(name);
        let data = self.data_mut(frame);
        if data.symbols.contains_key(&canonical) {
            panic!("symbol {} inserted twice into one frame", canonical);
        }
        data.symbols.insert(canonical.clone(), typing);
        data.order.push(canonical.clone());
        if let Some((_, tail)) = canonical.rsplit_once('.') {
            let tail = tail.to_string();
            data.aliases.entry(tail).or_insert(canonical);
        }
    }

    /// Insert or overwrite a symbol in `frame`.
    pub fn replace_symbol(&mut self, frame: FrameId, name: &str, typing: SymbolTyping) {
        let canonical = self.case.normalize(name);
        let data = self.data_mut(frame);
        if data.symbols.insert(canonical.clone(), typing).is_none() {
            data.order.push(canonical.clone());
        }
        if let Some((_, tail)) = canonical.rsplit_once('.') {
            let tail = tail.to_string();
            data.aliases.entry(tail).or_insert(canonical);
        }
    }

    /// Probe the local frame, then recurse to the parent.
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<(FrameId, String, &SymbolTyping)> {
        let normalized = self.case.normalize(name);
        let mut current = Some(frame);
        while let Some(id) = current {
            if let Some(canonical) = self.resolve_local(id, &normalized) {
                let typing = self.data(id).symbols.get(&canonical)?;
                return Some((id, canonical, typing));
            }
            current = self.data(id).parent;
        }
        None
    }

    /// Probe only the given frame.
    pub fn lookup_local(&self, frame: FrameId, name: &str) -> Option<&SymbolTyping> {
        let normalized = self.case.normalize(name);
        let canonical = self.resolve_local(frame, &normalized)?;
        self.data(frame).symbols.get(&canonical)
    }

    /// Remove a symbol, searching from `frame` outward. Returns false when
    /// the name resolves nowhere.
    pub fn remove(&mut self, frame: FrameId, name: &str) -> bool {
        let normalized = self.case.normalize(name);
        let mut current = Some(frame);
        while let Some(id) = current {
            if let Some(canonical) = self.resolve_local(id, &normalized) {
                let data = self.data_mut(id);
                data.symbols.remove(&canonical);
                data.order.retain(|n| n != &canonical);
                data.aliases.retain(|_, target| target != &canonical);
                return true;
            }
            current = self.data(id).parent;
        }
        false
    }

    /// Row-typed symbols visible from `frame`, innermost first, in insertion
    /// order within each frame, skipping shadowed names. When `stop` is
    /// given the walk does not continue past that frame.
    pub fn rows_in_scope(&self, frame: FrameId, stop: Option<FrameId>) -> Vec<(String, RowType)> {
        let mut rows = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut current = Some(frame);
        while let Some(id) = current {
            let data = self.data(id);
            for name in &data.order {
                if seen.iter().any(|s| s == name) {
                    continue;
                }
                seen.push(name.clone());
                if let Some(typing) = data.symbols.get(name) {
                    if let DataType::Row(row) = typing.expression_type() {
                        rows.push((name.clone(), row.clone()));
                    }
                }
            }
            if stop == Some(id) {
                break;
            }
            current = data.parent;
        }
        rows
    }

    /// Apply narrowing facts by writing shadowing entries into `frame`,
    /// preserving each symbol's declared type.
    ///
    /// Facts about the same variable fold sequentially through
    /// [`DataType::refine`]; facts about the same column keep the most
    /// specific claim (smallest domain) before rewriting just that column.
    pub fn refine_in_place(&mut self, frame: FrameId, refinements: &RefinementSet) {
        let mut column_refs: Vec<&Refinement> = Vec::new();
        for refinement in refinements.iter() {
            match &refinement.target {
                SymbolRef::Variable { name } => {
                    let Some((_, canonical, typing)) = self.lookup(frame, name) else {
                        continue;
                    };
                    let declared = typing.declared.clone();
                    let narrowed = DataType::refine(&refinement.ty, typing.expression_type());
                    self.replace_symbol(frame, &canonical, SymbolTyping::narrowed(declared, narrowed));
                }
                SymbolRef::Column { .. } => column_refs.push(refinement),
            }
        }

        // Group column facts by owning symbol, most specific claim wins per
        // column.
        let mut grouped: Vec<(String, Vec<&Refinement>)> = Vec::new();
        for refinement in column_refs {
            let SymbolRef::Column { table, .. } = &refinement.target else {
                continue;
            };
            match grouped
                .iter_mut()
                .find(|(name, _)| name.eq_ignore_ascii_case(table))
            {
                Some((_, list)) => list.push(refinement),
                None => grouped.push((table.clone(), vec![refinement])),
            }
        }
        for (table, facts) in grouped {
            let Some((_, canonical, typing)) = self.lookup(frame, &table) else {
                continue;
            };
            let declared = typing.declared.clone();
            let DataType::Row(row) = typing.expression_type() else {
                continue;
            };
            let mut row = row.clone();
            for column in row.columns.iter_mut() {
                let mut best: Option<&Refinement> = None;
                for fact in &facts {
                    let SymbolRef::Column { column: fact_col, .. } = &fact.target else {
                        continue;
                    };
                    if !column.name.matches_text(fact_col) {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some(current) => fact.ty.size_of_domain() < current.ty.size_of_domain(),
                    };
                    if better {
                        best = Some(fact);
                    }
                }
                if let Some(fact) = best {
                    column.ty = DataType::refine(&fact.ty, &column.ty);
                }
            }
            self.replace_symbol(
                frame,
                &canonical,
                SymbolTyping::narrowed(declared, DataType::Row(row)),
            );
        }
    }

    /// Push a child frame carrying the given narrowing facts: the standard
    /// way a branch sees narrowed knowledge without touching the parent.
    pub fn new_frame_from_refinements(
        &mut self,
        parent: FrameId,
        refinements: &RefinementSet,
    ) -> FrameId {
        let child = self.push_child(parent);
        self.refine_in_place(child, refinements);
        child
    }
}
