//! Hook registry: the hooks of each point, fired in priority order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use quill_core::hook::{Hook, HookContext, HookPoint};
use tracing::{debug, warn};

#[derive(Default)]
pub struct HookRegistry {
    by_point: HashMap<HookPoint, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `hook`, replacing an earlier hook with the same name.
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        let replaced = self.unregister(hook.name());
        if replaced {
            warn!(hook = hook.name(), "Hook already registered, replacing");
        }
        let hooks = self.by_point.entry(hook.point()).or_default();
        hooks.push(hook);
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let mut removed = false;
        for hooks in self.by_point.values_mut() {
            let before = hooks.len();
            hooks.retain(|h| h.name() != name);
            removed |= hooks.len() != before;
        }
        removed
    }

    pub fn hooks(&self, point: HookPoint) -> &[Arc<dyn Hook>] {
        self.by_point.get(&point).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_point.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every applicable hook for `ctx.point` in order. Errors and panics
    /// are logged and never reach the caller. Returns how many hooks succeeded.
    pub async fn fire(&self, ctx: &HookContext) -> usize {
        let mut succeeded = 0;
        for hook in self.hooks(ctx.point).iter().filter(|h| h.applies_to(ctx)) {
            debug!(hook = hook.name(), point = %ctx.point, "Running hook");
            match AssertUnwindSafe(hook.run(ctx)).catch_unwind().await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => warn!(hook = hook.name(), point = %ctx.point, error = %e, "Hook failed"),
                Err(_) => warn!(hook = hook.name(), point = %ctx.point, "Hook panicked"),
            }
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::error::HookError;
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        point: HookPoint,
        priority: i32,
        behaviour: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Hook for Record {
        fn name(&self) -> &str {
            self.name
        }
        fn point(&self) -> HookPoint {
            self.point
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn applies_to(&self, ctx: &HookContext) -> bool {
            ctx.tool_name.as_deref() != Some("skip")
        }
        async fn run(&self, _ctx: &HookContext) -> Result<(), HookError> {
            self.log.lock().unwrap().push(self.name.to_string());
            match self.behaviour {
                "fail" => Err(HookError::Failed {
                    hook: self.name.into(),
                    reason: "exit code 1".into(),
                }),
                "panic" => panic!("hook blew up"),
                _ => Ok(()),
            }
        }
    }

    fn hook(name: &'static str, priority: i32, behaviour: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Hook> {
        Arc::new(Record {
            name,
            point: HookPoint::PreToolCall,
            priority,
            behaviour,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn fires_by_priority_and_survives_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(hook("low", -1, "ok", &log));
        registry.register(hook("broken", 5, "fail", &log));
        registry.register(hook("crashes", 3, "panic", &log));
        registry.register(hook("high", 10, "ok", &log));

        let ctx = HookContext::tool_call(HookPoint::PreToolCall, "bash", "{}");
        assert_eq!(registry.fire(&ctx).await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["high", "broken", "crashes", "low"]);

        // other points and filtered calls run nothing
        assert_eq!(registry.fire(&HookContext::error("x")).await, 0);
        let skipped = HookContext::tool_call(HookPoint::PreToolCall, "skip", "{}");
        assert_eq!(registry.fire(&skipped).await, 0);
    }

    #[test]
    fn same_name_replaces() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(hook("fmt", 0, "ok", &log));
        registry.register(hook("fmt", 1, "fail", &log));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.hooks(HookPoint::PreToolCall)[0].priority(), 1);
        assert!(registry.unregister("fmt"));
        assert!(registry.is_empty());
    }
}
