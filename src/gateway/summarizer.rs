//! Background memory summarization for premium users.

use std::sync::Arc;

use companion_core::context::ContextEntry;
use companion_providers::FallbackChain;
use companion_store::Store;
use tracing::{debug, error, info, warn};

use super::Gateway;
use crate::memory;

impl Gateway {
    /// Digest recent turns into the user's long-term memory.
    ///
    /// A failed provider call falls back to keyword extraction over the
    /// user's own turns and a synthesized summary sentence.
    pub(super) async fn summarize_memory(
        store: Store,
        chain: Arc<FallbackChain>,
        user_id: String,
        entries: Vec<ContextEntry>,
    ) {
        let (extracted, synthesize) = match chain
            .try_complete(&memory::summary_request(&entries))
            .await
        {
            Ok(resp) => (memory::parse_digest(&resp.text), false),
            Err(e) => {
                warn!("summarizer: provider chain failed for {user_id}: {e}");
                (memory::extract_from_turns(&entries), true)
            }
        };

        if extracted.is_empty() {
            debug!("summarizer: nothing to remember for {user_id}");
            return;
        }

        let result = store
            .update_user(&user_id, move |r| {
                memory::merge(&mut r.memory, extracted);
                if synthesize {
                    let summary = memory::fallback_summary(&r.memory);
                    if !summary.is_empty() {
                        r.memory.last_interaction_summary = summary;
                    }
                }
            })
            .await;

        match result {
            Ok(Some(())) => info!("summarizer: memory updated for {user_id}"),
            Ok(None) => debug!("summarizer: {user_id} no longer exists"),
            Err(e) => error!("summarizer: failed to save memory for {user_id}: {e}"),
        }
    }
}
