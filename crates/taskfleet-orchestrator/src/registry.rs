use std::cmp::Reverse;
use std::collections::HashMap;
use taskfleet_core::{FleetError, FleetResult, TaskId, TaskRecord, TaskStatus};

/// In-memory, append-only store of task records.
///
/// Records are never removed during a run. Iteration follows insertion order,
/// which also serves as the last tie-break for [`pending_by_priority`](Self::pending_by_priority).
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
    order: Vec<TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Rebuild a registry from previously exported records.
    pub fn restore(records: impl IntoIterator<Item = TaskRecord>) -> FleetResult<Self> {
        let mut registry = Self::new();
        for record in records {
            registry.insert(record)?;
        }
        Ok(registry)
    }

    /// Add a task. Fails if the id is already present.
    pub fn insert(&mut self, task: TaskRecord) -> FleetResult<TaskId> {
        let id = task.id().clone();
        if self.tasks.contains_key(&id) {
            return Err(FleetError::DuplicateId(id));
        }
        self.order.push(id.clone());
        self.tasks.insert(id.clone(), task);
        Ok(id)
    }

    /// Get a task by ID.
    pub fn get(&self, id: &TaskId) -> FleetResult<&TaskRecord> {
        self.tasks
            .get(id)
            .ok_or_else(|| FleetError::NotFound(format!("task {id}")))
    }

    /// Get a mutable reference to a task.
    pub fn get_mut(&mut self, id: &TaskId) -> FleetResult<&mut TaskRecord> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| FleetError::NotFound(format!("task {id}")))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Pending tasks, highest priority first; equal priorities are served
    /// in creation order.
    pub fn pending_by_priority(&self) -> Vec<&TaskRecord> {
        let mut pending: Vec<(usize, &TaskRecord)> = self
            .all()
            .into_iter()
            .enumerate()
            .filter(|(_, t)| t.status() == TaskStatus::Pending)
            .collect();
        pending.sort_by_key(|(seq, t)| (Reverse(t.priority()), t.created_at(), *seq));
        pending.into_iter().map(|(_, t)| t).collect()
    }

    /// All tasks in insertion order.
    pub fn all(&self) -> Vec<&TaskRecord> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Clone every record, in insertion order.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.all().into_iter().cloned().collect()
    }

    /// Number of tasks currently in `status`.
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status() == status).count()
    }

    /// Total number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
