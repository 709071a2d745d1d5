//! Build request factory.

use crate::error::Result;
use crate::priority::{Priority, PriorityContext};
use drydock_core::{BuildSetId, Properties, SourceStampId};
use drydock_db::StoreTx;
use tracing::debug;

/// Create one build set: a build-set row plus one build request per target
/// builder, priorities resolved per builder, all on the caller's
/// transaction. Either every request becomes visible or none does; a
/// resolver failure aborts before anything commits. Builder iteration
/// order is preserved in storage order.
pub async fn create_buildset(
    tx: &mut dyn StoreTx,
    sourcestamp: SourceStampId,
    reason: &str,
    properties: &Properties,
    builder_names: &[String],
    priority: &Priority,
) -> Result<BuildSetId> {
    let buildset = tx.insert_buildset(sourcestamp, reason).await?;
    for builder_name in builder_names {
        let resolved = priority.resolve(&PriorityContext {
            sourcestamp,
            reason,
            properties,
            builder_name,
        })?;
        tx.insert_buildrequest(buildset, builder_name, resolved).await?;
        debug!(buildset = %buildset, builder = %builder_name, priority = resolved, "queued build request");
    }
    Ok(buildset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use drydock_db::{MemStore, StateStore};
    use std::sync::Arc;

    async fn run_factory(
        store: &MemStore,
        builders: &[&str],
        priority: Priority,
    ) -> Result<BuildSetId> {
        let names: Vec<String> = builders.iter().map(|s| s.to_string()).collect();
        let mut tx = store.begin().await.unwrap();
        let result = create_buildset(
            &mut *tx,
            SourceStampId::new(1),
            "my reason",
            &Properties::new(),
            &names,
            &priority,
        )
        .await;
        if result.is_ok() {
            tx.commit().await.unwrap();
        }
        result
    }

    #[tokio::test]
    async fn test_default_priority() {
        let store = MemStore::new();
        run_factory(&store, &["tbuild"], Priority::default())
            .await
            .unwrap();

        let requests = store.buildrequests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].priority, 0);
        assert_eq!(requests[0].builder_name, "tbuild");
    }

    #[tokio::test]
    async fn test_constant_priority_spans_builders() {
        let store = MemStore::new();
        run_factory(&store, &["tbuild", "tbuild2"], Priority::Constant(1))
            .await
            .unwrap();

        let requests = store.buildrequests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            (requests[0].priority, requests[0].builder_name.as_str()),
            (1, "tbuild")
        );
        assert_eq!(
            (requests[1].priority, requests[1].builder_name.as_str()),
            (1, "tbuild2")
        );
    }

    #[tokio::test]
    async fn test_computed_priority_sees_full_context() {
        let store = MemStore::new();
        let priority = Priority::Computed(Arc::new(|ctx: &PriorityContext<'_>| {
            assert_eq!(ctx.sourcestamp, SourceStampId::new(1));
            assert_eq!(ctx.reason, "my reason");
            assert_eq!(ctx.builder_name, "tbuild3");
            Ok(2)
        }));
        run_factory(&store, &["tbuild3"], priority).await.unwrap();

        let requests = store.buildrequests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            (requests[0].priority, requests[0].builder_name.as_str()),
            (2, "tbuild3")
        );
    }

    #[tokio::test]
    async fn test_resolver_failure_aborts_whole_buildset() {
        let store = MemStore::new();
        let priority = Priority::Computed(Arc::new(|ctx: &PriorityContext<'_>| {
            if ctx.builder_name == "bad" {
                Err("no priority for you".into())
            } else {
                Ok(0)
            }
        }));
        let err = run_factory(&store, &["good", "bad", "other"], priority)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PriorityResolution(_)));
        assert!(store.buildrequests().await.unwrap().is_empty());
    }
}
