//! MachinePool: the fixed set of machines and their busy/free state.
//!
//! Machines are created once from the rack topology and never destroyed.
//! IDs are dense: rack 0 holds `0..racks[0]`, rack 1 continues from there.
//! Both `reserve` and `release` validate every machine before touching
//! any of them, so a failed call leaves the pool unchanged.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use rackgrid_core::{JobId, MachineId};

use crate::error::{StateError, StateResult};
use crate::types::{Machine, MachineState, RackUsage};

#[derive(Debug, Clone)]
pub struct MachinePool {
    machines: Vec<Machine>,
    rack_count: u32,
}

impl MachinePool {
    /// Build a pool with `racks[i]` machines in rack `i`.
    pub fn new(racks: &[u32]) -> Self {
        let mut machines = Vec::with_capacity(racks.iter().sum::<u32>() as usize);
        for (rack, &count) in racks.iter().enumerate() {
            for _ in 0..count {
                machines.push(Machine {
                    id: machines.len() as MachineId,
                    rack: rack as u32,
                    state: MachineState::Free,
                });
            }
        }
        debug!(machines = machines.len(), racks = racks.len(), "machine pool created");
        Self {
            machines,
            rack_count: racks.len() as u32,
        }
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn get(&self, id: MachineId) -> Option<&Machine> {
        self.machines.get(id as usize)
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// The job holding a machine, or `None` if it is free.
    pub fn owner(&self, id: MachineId) -> StateResult<Option<JobId>> {
        self.get(id)
            .map(Machine::owner)
            .ok_or(StateError::MachineNotFound(id))
    }

    /// IDs of all currently unallocated machines.
    pub fn free(&self) -> BTreeSet<MachineId> {
        self.machines
            .iter()
            .filter(|m| m.is_free())
            .map(|m| m.id)
            .collect()
    }

    pub fn free_count(&self) -> usize {
        self.machines.iter().filter(|m| m.is_free()).count()
    }

    /// Bind every machine in `ids` to `job_id`. All-or-nothing.
    pub fn reserve(&mut self, ids: &BTreeSet<MachineId>, job_id: JobId) -> StateResult<()> {
        for &id in ids {
            let machine = self.get(id).ok_or(StateError::MachineNotFound(id))?;
            if let MachineState::Allocated { job_id: holder } = machine.state {
                return Err(StateError::MachineUnavailable {
                    machine_id: id,
                    job_id: holder,
                });
            }
        }

        for &id in ids {
            self.machines[id as usize].state = MachineState::Allocated { job_id };
        }
        debug!(job_id, machines = ?ids, "machines reserved");
        Ok(())
    }

    /// Free every machine in `ids`. All-or-nothing.
    ///
    /// Machines may belong to different jobs. Returns the released IDs
    /// grouped by the job that held them.
    pub fn release(
        &mut self,
        ids: &BTreeSet<MachineId>,
    ) -> StateResult<BTreeMap<JobId, BTreeSet<MachineId>>> {
        let mut by_job: BTreeMap<JobId, BTreeSet<MachineId>> = BTreeMap::new();
        for &id in ids {
            match self.owner(id)? {
                Some(job_id) => {
                    by_job.entry(job_id).or_default().insert(id);
                }
                None => return Err(StateError::MachineNotAllocated(id)),
            }
        }

        for &id in ids {
            self.machines[id as usize].state = MachineState::Free;
        }
        debug!(machines = ?ids, jobs = by_job.len(), "machines released");
        Ok(by_job)
    }

    /// Free/total counts per rack, in rack order.
    pub fn rack_usage(&self) -> Vec<RackUsage> {
        let mut usage: Vec<RackUsage> = (0..self.rack_count)
            .map(|rack| RackUsage {
                rack,
                total: 0,
                free: 0,
            })
            .collect();
        for m in &self.machines {
            let entry = &mut usage[m.rack as usize];
            entry.total += 1;
            if m.is_free() {
                entry.free += 1;
            }
        }
        usage
    }
}
