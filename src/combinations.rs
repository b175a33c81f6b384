//! # Combination grouping
//!
//! Turns the configured metric bindings `(n, k)` into the ordered list of column
//! combinations a job computes metrics for.
//!
//! ## Enumeration
//!
//! For a binding `(n, k)`:
//!
//! 1. **Dataset groups** – every size-`n` set of non-masking datasets containing the
//!    temporal reference. The reference comes first, the others follow in registration
//!    order ([`itertools::Itertools::combinations`] keeps it lexicographic).
//! 2. **Column keys** – inside a group, one column of the temporal reference followed
//!    by every size-`(k-1)` subset of the other datasets' columns, in per-dataset
//!    registration order.
//!
//! When `k < n` the same key is produced by several groups; it is assigned to the
//! first group containing it, so each key is computed once. The plan is a pure
//! function of the registrations: the same configuration always yields the same keys
//! in the same order.
//!
//! ## Configuration errors
//!
//! * `k = 0`, `k > n` or `n` larger than the number of non-masking datasets:
//!   [`GeovalError::InvalidBinding`].
//! * The same `(n, k)` twice: [`GeovalError::DuplicateBinding`].
//! * Two bindings producing the same key: [`GeovalError::OverlappingBindings`].
use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::datasets::DatasetConfig;
use crate::geoval_errors::GeovalError;
use crate::matching::ColumnId;

/// A metrics binding: groups of `n` datasets, `k` columns per calculator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding {
    pub n: usize,
    pub k: usize,
}

impl Binding {
    pub fn new(n: usize, k: usize) -> Self {
        Binding { n, k }
    }
}

impl From<(usize, usize)> for Binding {
    fn from((n, k): (usize, usize)) -> Self {
        Binding { n, k }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.n, self.k)
    }
}

/// Names of the datasets matched together, temporal reference first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetGroup(SmallVec<[String; 4]>);

impl DatasetGroup {
    pub fn reference(&self) -> &str {
        &self.0[0]
    }

    pub fn others(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.0.iter().any(|d| d == dataset)
    }
}

impl fmt::Display for DatasetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Ordered tuple of `(dataset, column)` pairs; the first one is the reference column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombinationKey(SmallVec<[ColumnId; 4]>);

impl CombinationKey {
    pub fn new(columns: impl IntoIterator<Item = ColumnId>) -> Self {
        CombinationKey(columns.into_iter().collect())
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.0
    }

    pub fn reference(&self) -> &ColumnId {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable flat name, e.g. `ismn.soil_moisture_with_ascat.sm`.
    pub fn output_name(&self) -> String {
        self.0.iter().map(ColumnId::to_string).join("_with_")
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self
            .0
            .iter()
            .map(|c| format!("({}, {})", c.dataset, c.column))
            .join(", ");
        write!(f, "[{pairs}]")
    }
}

/// One unit of work: a key, the binding it belongs to and the group it is matched in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub binding: Binding,
    pub group: usize,
    pub key: CombinationKey,
}

/// Every group to match and every key to compute, in deterministic order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombinationPlan {
    groups: Vec<DatasetGroup>,
    entries: Vec<PlanEntry>,
}

impl CombinationPlan {
    /// Enumerate groups and keys for `bindings`.
    ///
    /// Arguments
    /// -----------------
    /// * `datasets` – registrations in registration order; masking datasets are skipped.
    /// * `temporal_reference` – the non-masking dataset every group is matched on.
    /// * `bindings` – the configured `(n, k)` pairs, in registration order.
    ///
    /// Return
    /// ----------
    /// * The plan, or the binding error described in the module documentation.
    pub fn new(
        datasets: &[DatasetConfig],
        temporal_reference: &str,
        bindings: &[Binding],
    ) -> Result<Self, GeovalError> {
        let candidates: Vec<&DatasetConfig> = datasets.iter().filter(|d| !d.is_masking).collect();
        let Some(reference) = candidates.iter().find(|d| d.name == temporal_reference) else {
            return Err(GeovalError::UnknownReference {
                role: "temporal".into(),
                name: temporal_reference.to_string(),
            });
        };
        let others: Vec<&DatasetConfig> = candidates
            .iter()
            .copied()
            .filter(|d| d.name != temporal_reference)
            .collect();

        let mut plan = CombinationPlan::default();
        let mut owner: HashMap<CombinationKey, Binding, RandomState> = HashMap::default();

        for (idx, &binding) in bindings.iter().enumerate() {
            let Binding { n, k } = binding;
            if bindings[..idx].contains(&binding) {
                return Err(GeovalError::DuplicateBinding { n, k });
            }
            validate_binding(binding, candidates.len())?;

            for subset in others.iter().copied().combinations(n - 1) {
                let names = std::iter::once(reference.name.clone())
                    .chain(subset.iter().map(|d| d.name.clone()))
                    .collect();
                let group = plan.group_index(DatasetGroup(names));

                let other_columns: Vec<ColumnId> = subset
                    .iter()
                    .flat_map(|d| d.columns.iter().map(|c| ColumnId::new(&d.name, c)))
                    .collect();

                for ref_column in &reference.columns {
                    let ref_id = ColumnId::new(&reference.name, ref_column);
                    for rest in other_columns.iter().cloned().combinations(k - 1) {
                        let key = CombinationKey::new(std::iter::once(ref_id.clone()).chain(rest));
                        match owner.get(&key) {
                            // already computed in an earlier group of this binding
                            Some(b) if *b == binding => continue,
                            Some(b) => {
                                return Err(GeovalError::OverlappingBindings {
                                    first: (b.n, b.k),
                                    second: (n, k),
                                    key: key.to_string(),
                                })
                            }
                            None => {}
                        }
                        owner.insert(key.clone(), binding);
                        plan.entries.push(PlanEntry {
                            binding,
                            group,
                            key,
                        });
                    }
                }
            }
        }
        Ok(plan)
    }

    fn group_index(&mut self, group: DatasetGroup) -> usize {
        match self.groups.iter().position(|g| *g == group) {
            Some(idx) => idx,
            None => {
                self.groups.push(group);
                self.groups.len() - 1
            }
        }
    }

    pub fn groups(&self) -> &[DatasetGroup] {
        &self.groups
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Entries matched within group `group`, in plan order.
    pub fn entries_for_group(&self, group: usize) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.group == group)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CombinationKey> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_binding(binding: Binding, available: usize) -> Result<(), GeovalError> {
    let Binding { n, k } = binding;
    let reason = if k == 0 {
        "k must be at least 1".to_string()
    } else if k > n {
        "k must not exceed n".to_string()
    } else if n > available {
        format!("only {available} non-masking datasets are registered")
    } else {
        return Ok(());
    };
    Err(GeovalError::InvalidBinding { n, k, reason })
}
