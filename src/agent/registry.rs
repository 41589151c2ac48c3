//! Registry of per-user contexts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::agent::agent_loop::AgentDeps;
use crate::agent::user_context::UserContext;

/// Hands out one [`UserContext`] per user id.
///
/// Each context sits behind its own mutex, so a user's operations run one at a
/// time while different users never contend.
pub struct UserRegistry {
    deps: Arc<AgentDeps>,
    contexts: RwLock<HashMap<String, Arc<Mutex<UserContext>>>>,
}

impl UserRegistry {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self {
            deps,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Get the user's context, creating (and resuming) it on first use.
    ///
    /// The resume runs under the new context's own lock, after the registry
    /// lock is released; callers for the same user wait on that lock.
    pub async fn get_or_create(&self, user_id: &str) -> Arc<Mutex<UserContext>> {
        if let Some(ctx) = self.contexts.read().await.get(user_id) {
            return Arc::clone(ctx);
        }

        let mut contexts = self.contexts.write().await;
        if let Some(ctx) = contexts.get(user_id) {
            return Arc::clone(ctx);
        }

        let ctx = Arc::new(Mutex::new(UserContext::new(user_id, &self.deps)));
        let mut guard = Arc::clone(&ctx).lock_owned().await;
        contexts.insert(user_id.to_string(), Arc::clone(&ctx));
        drop(contexts);

        guard.resume().await;
        tracing::debug!(user_id, "User context created");
        ctx
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<Mutex<UserContext>>> {
        self.contexts.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }
}
