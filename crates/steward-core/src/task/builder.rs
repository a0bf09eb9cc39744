use super::handle::{Task, TaskOutput};
use super::job::Job;
use crate::domain::{JobError, TagSet, TaskTag};

/// Fluent construction of a `Task`.
///
/// ```ignore
/// let task = TaskBuilder::new()
///     .display_name("restart")
///     .tag(TaskTag::label("effector"))
///     .body(Job::from_fn(|| Ok(())))
///     .build();
/// ```
pub struct TaskBuilder<T> {
    display_name: Option<String>,
    description: String,
    tags: TagSet,
    body: Option<Job<T>>,
}

impl<T: TaskOutput> TaskBuilder<T> {
    pub fn new() -> Self {
        Self {
            display_name: None,
            description: String::new(),
            tags: TagSet::new(),
            body: None,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn tags(mut self, tags: &TagSet) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn body(mut self, job: Job<T>) -> Self {
        self.body = Some(job);
        self
    }

    /// Build the task. A task without a body fails when run.
    pub fn build(self) -> Task<T> {
        let name = self.display_name.unwrap_or_else(|| "task".to_string());
        let body = self.body.unwrap_or_else(|| {
            let msg = format!("task '{name}' has no body");
            Job::from_fn(move || Err(JobError::failed(&msg)))
        });
        Task::new(name, self.description, self.tags, body)
    }
}

impl<T: TaskOutput> Default for TaskBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
