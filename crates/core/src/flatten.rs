//! Inlines remote calls and synthesizes concurrent-clone siblings.
//!
//! Flattening proceeds in passes. Every pass relabels all units `1..=n`,
//! then splices a deep clone of the target transaction's unit list in
//! place of each remote unit found; passes repeat until no remote units
//! remain, which resolves transitive and nested remote calls. Internal
//! transactions (remote-call targets that are not independently
//! invocable) are then dropped from the visible list.
//!
//! Afterwards, every transaction containing a WRITE operation gets exactly
//! one cloned sibling transaction appended to its microservice: a full
//! deep copy with every unit flagged cloned, modeling a single concurrent
//! overlapping invocation. One sibling per transaction, no matter how many
//! writes it contains. A final relabel makes the labels that the rest of
//! the pipeline keys on.

use hashbrown::HashSet;

use crate::error::{Error, ModelError};
use crate::model::{
    BusinessTransaction, OperationKind, System, Unit, UnitKind, UnitLabel,
};

/// Suffix of synthesized concurrent-clone sibling transactions.
pub const CLONE_SUFFIX: &str = "#clone";

/// Flatten `system`: inline all remote units, drop internal-only
/// transactions, expand write-bearing transactions with clone siblings,
/// and relabel.
///
/// Flattening an already-flat system is a no-op up to relabelling: the
/// same unit count and labels come out.
///
/// # Errors
///
/// [`ModelError::DuplicateTransaction`] if two transactions share a name
/// (names are identity for remote targets and conflict probing);
/// [`ModelError::DanglingRemote`] if a remote unit names an unknown
/// transaction; [`Error::BrokenInvariant`] if inlining fails to reach a
/// fixpoint (a recursive remote-call chain).
pub fn flatten(mut system: System) -> Result<System, Error> {
    ensure_unique_names(&system)?;
    // An acyclic remote-call graph needs at most one pass per transaction.
    let max_passes = system
        .microservices
        .iter()
        .map(|ms| ms.transactions.len())
        .sum::<usize>()
        + 1;

    let mut passes = 0;
    loop {
        relabel(&mut system);
        if !inline_remote_pass(&mut system)? {
            break;
        }
        passes += 1;
        if passes > max_passes {
            return Err(Error::BrokenInvariant(
                "remote-call inlining did not reach a fixpoint",
            ));
        }
    }

    for ms in &mut system.microservices {
        ms.transactions.retain(|bt| !bt.internal);
    }
    relabel(&mut system);

    expand_clone_siblings(&mut system)?;
    relabel(&mut system);

    tracing::debug!(units = system.unit_count(), "flattened system");
    Ok(system)
}

/// Reject name reuse across the whole system, internal transactions
/// included. Everything downstream resolves transactions by name.
fn ensure_unique_names(system: &System) -> Result<(), Error> {
    let mut seen: HashSet<&str> = HashSet::new();
    for ms in &system.microservices {
        for bt in &ms.transactions {
            if !seen.insert(bt.name.as_str()) {
                return Err(Error::ModelInconsistency(ModelError::DuplicateTransaction {
                    name: bt.name.clone(),
                }));
            }
        }
    }
    Ok(())
}

/// Reassign labels `1..=n` in declaration order across the whole system.
fn relabel(system: &mut System) {
    let mut counter = 0u32;
    for ms in &mut system.microservices {
        for bt in &mut ms.transactions {
            for unit in &mut bt.units {
                counter += 1;
                unit.label = UnitLabel(counter);
            }
        }
    }
}

/// Replace every remote unit present at the start of the pass with clones
/// of its target's units. Returns whether anything was replaced.
fn inline_remote_pass(system: &mut System) -> Result<bool, Error> {
    // Two phases to keep the borrow checker honest: resolve replacement
    // unit lists against the immutable system, then splice.
    let mut replacements: Vec<(usize, usize, Vec<Unit>)> = Vec::new();

    for (mi, ms) in system.microservices.iter().enumerate() {
        for (bi, bt) in ms.transactions.iter().enumerate() {
            if !bt.units.iter().any(|u| matches!(u.kind, UnitKind::Remote(_))) {
                continue;
            }
            let mut new_units: Vec<Unit> = Vec::with_capacity(bt.units.len());
            for unit in &bt.units {
                match &unit.kind {
                    UnitKind::Local(_) => new_units.push(unit.clone()),
                    UnitKind::Remote(target) => {
                        let (tmi, tbi) = system.find_transaction(target).ok_or_else(|| {
                            Error::ModelInconsistency(ModelError::DanglingRemote {
                                owner: bt.name.clone(),
                                target: target.clone(),
                            })
                        })?;
                        let target_units =
                            &system.microservices[tmi].transactions[tbi].units;
                        new_units.extend(target_units.iter().cloned());
                    }
                }
            }
            replacements.push((mi, bi, new_units));
        }
    }

    let changed = !replacements.is_empty();
    for (mi, bi, new_units) in replacements {
        system.microservices[mi].transactions[bi].units = new_units;
    }
    Ok(changed)
}

/// Append one cloned sibling per write-bearing transaction.
fn expand_clone_siblings(system: &mut System) -> Result<(), Error> {
    // Sibling names must stay unique system-wide, like every other name.
    let mut names: HashSet<String> = system
        .microservices
        .iter()
        .flat_map(|ms| &ms.transactions)
        .map(|bt| bt.name.clone())
        .collect();
    for ms in &mut system.microservices {
        let mut siblings: Vec<BusinessTransaction> = Vec::new();
        for bt in &ms.transactions {
            // Clone families are never expanded themselves, and a second
            // flatten of the same system must not stack suffixes.
            if bt.units.iter().any(|u| u.cloned) {
                continue;
            }
            if !has_write(bt) {
                continue;
            }
            let sibling_name = format!("{}{CLONE_SUFFIX}", bt.name);
            if !names.insert(sibling_name.clone()) {
                continue;
            }

            let units: Vec<Unit> = bt
                .units
                .iter()
                .map(|u| {
                    let mut clone = u.clone();
                    clone.cloned = true;
                    clone
                })
                .collect();
            let sibling =
                BusinessTransaction::new(sibling_name, units, bt.params.clone())
                    .map_err(Error::ModelInconsistency)?;
            siblings.push(sibling);
        }
        ms.transactions.extend(siblings);
    }
    Ok(())
}

fn has_write(bt: &BusinessTransaction) -> bool {
    bt.units.iter().any(|u| {
        u.as_local().is_some_and(|lt| {
            lt.operations
                .iter()
                .any(|op| op.kind == OperationKind::Write)
        })
    })
}
