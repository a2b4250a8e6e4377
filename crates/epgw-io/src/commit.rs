//! Commit coordinator.
//!
//! Invokes the envelope's commit handle exactly once, after either a
//! successful downstream produce or a successful DLQ produce. Taking the
//! handle out of the envelope makes a second invocation impossible. A commit
//! failure is logged and never re-raised: the broker re-delivers the message
//! and a later delivery commits (at-least-once).

use epgw_core::envelope::{Envelope, EnvelopeState};
use tracing::{debug, error, warn};

pub fn commit(env: &mut Envelope) {
    match env.take_commit() {
        None => {
            warn!(
                topic = %env.source_topic,
                partition = env.partition,
                offset = env.offset,
                "no commit handle attached, skipping offset commit"
            );
        }
        Some(handle) => match handle.commit() {
            Ok(()) => {
                env.state = EnvelopeState::Committed;
                debug!(
                    topic = %env.source_topic,
                    partition = env.partition,
                    offset = env.offset,
                    "offset committed"
                );
            }
            Err(err) => {
                env.state = EnvelopeState::CommitFailed;
                error!(
                    topic = %env.source_topic,
                    partition = env.partition,
                    offset = env.offset,
                    error = %err,
                    "offset commit failed, message may be re-delivered"
                );
            }
        },
    }
}
