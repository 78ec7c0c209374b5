pub mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::models::IssueState;
use crate::server::AppState;
use crate::workflow::publish::publish_triage;

use task::TriageTask;

/// Pending triage tasks, one FIFO per repository.
#[derive(Default)]
pub struct TaskQueue {
    queues: HashMap<String, VecDeque<TriageTask>>,
    /// Wakes the processor after an enqueue.
    notify: Option<mpsc::UnboundedSender<()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notifier(&mut self, tx: mpsc::UnboundedSender<()>) {
        self.notify = Some(tx);
    }

    /// Queue a task unless the same issue is already waiting.
    pub fn enqueue(&mut self, task: TriageTask) -> bool {
        let queue = self.queues.entry(task.repo_full_name.clone()).or_default();
        if queue.iter().any(|t| t.issue_number == task.issue_number) {
            tracing::debug!(task = %task.description(), "Task already queued");
            return false;
        }

        tracing::info!(repo = %task.repo_full_name, task = %task.description(), "Enqueuing task");
        queue.push_back(task);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
        true
    }

    /// Remove all pending tasks for a specific issue from the queue.
    pub fn cancel_issue(&mut self, repo_full_name: &str, issue_number: u64) -> usize {
        let Some(queue) = self.queues.get_mut(repo_full_name) else {
            return 0;
        };
        let before = queue.len();
        queue.retain(|task| task.issue_number != issue_number);
        let removed = before - queue.len();
        if queue.is_empty() {
            self.queues.remove(repo_full_name);
        }
        if removed > 0 {
            tracing::info!(
                repo = repo_full_name,
                issue = issue_number,
                removed,
                "Cancelled queued tasks for closed issue"
            );
        }
        removed
    }

    /// Take the next task from any repo that has pending work.
    pub fn take_next(&mut self) -> Option<TriageTask> {
        let repo = self
            .queues
            .iter()
            .find(|(_, q)| !q.is_empty())
            .map(|(k, _)| k.clone())?;

        let task = self.queues.get_mut(&repo).and_then(|q| q.pop_front());
        if self.queues.get(&repo).is_some_and(|q| q.is_empty()) {
            self.queues.remove(&repo);
        }
        task
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending task, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.queues.clear();
        dropped
    }
}

/// Run the background queue processor. At most
/// `server.max_concurrent_triage` issues are triaged at once.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    {
        let mut queue = state.task_queue.write().await;
        queue.set_notifier(tx);
    }

    let permits = Arc::new(Semaphore::new(state.config.server.max_concurrent_triage));
    tracing::info!(
        max_concurrent = state.config.server.max_concurrent_triage,
        "Queue processor started"
    );

    while rx.recv().await.is_some() {
        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                return;
            };

            // Register as in-flight under the queue lock so a concurrent
            // close event sees the task in one place or the other.
            let next = {
                let mut queue = state.task_queue.write().await;
                match queue.take_next() {
                    Some(task) => {
                        let (run_id, cancel) = state.register_in_flight(task.key()).await;
                        Some((task, run_id, cancel))
                    }
                    None => None,
                }
            };

            let Some((task, run_id, cancel)) = next else {
                break;
            };

            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let _permit = permit;
                tracing::info!(task = %task.description(), "Processing task");

                let result = state
                    .orchestrator
                    .run_with_cancel(IssueState::new(&task.title, &task.body), cancel)
                    .await;
                state.finish_in_flight(&task.key(), run_id).await;

                match publish_triage(&state, &task, &result).await {
                    Ok(outcome) => {
                        tracing::info!(
                            task = %task.description(),
                            outcome = ?outcome,
                            "Task completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            task = %task.description(),
                            error = %e,
                            "Task failed"
                        );
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(repo: &str, issue_number: u64) -> TriageTask {
        TriageTask {
            repo_full_name: repo.to_string(),
            issue_number,
            title: format!("Issue {issue_number}"),
            body: String::new(),
        }
    }

    #[test]
    fn test_enqueue_deduplicates_issue() {
        let mut queue = TaskQueue::new();
        assert!(queue.enqueue(task("o/r", 1)));
        assert!(!queue.enqueue(task("o/r", 1)));
        assert!(queue.enqueue(task("o/other", 1)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_cancel_issue_removes_only_that_issue() {
        let mut queue = TaskQueue::new();
        queue.enqueue(task("o/r", 1));
        queue.enqueue(task("o/r", 2));

        assert_eq!(queue.cancel_issue("o/r", 1), 1);
        assert_eq!(queue.cancel_issue("o/missing", 1), 0);

        let next = queue.take_next().unwrap();
        assert_eq!(next.issue_number, 2);
        assert!(queue.take_next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_next_is_fifo_per_repo() {
        let mut queue = TaskQueue::new();
        queue.enqueue(task("o/r", 3));
        queue.enqueue(task("o/r", 1));

        assert_eq!(queue.take_next().unwrap().issue_number, 3);
        assert_eq!(queue.take_next().unwrap().issue_number, 1);
        assert_eq!(queue.clear(), 0);
    }
}
