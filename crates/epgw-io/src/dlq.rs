//! Dead-letter queue funnel.
//!
//! Every catalogued pipeline error ends here. The original payload bytes are
//! preserved as the message body, the original inbound headers are re-attached
//! together with the diagnostic headers, and the message goes to the channel
//! DLQ topic for the envelope's datacenter. Only a successful DLQ produce
//! triggers the commit; a failed one leaves the offset uncommitted so the
//! broker re-delivers.

use epgw_core::config::ChannelConfig;
use epgw_core::envelope::{Envelope, EnvelopeState};
use epgw_core::error::GatewayError;
use epgw_core::headers;
use epgw_tx::route;
use tracing::{error, warn};

use crate::commit;
use crate::producer::Publisher;

pub async fn route_to_dlq(
    env: &mut Envelope,
    err: &GatewayError,
    channel: &ChannelConfig,
    publisher: &dyn Publisher,
) {
    error!(
        topic = %env.source_topic,
        partition = env.partition,
        offset = env.offset,
        kind = err.kind(),
        error = %err,
        "pipeline failed, routing to DLQ"
    );

    let Some(datacenter) = env
        .datacenter
        .clone()
        .or_else(|| {
            channel
                .datacenter_key_for_topic(&env.source_topic)
                .map(str::to_string)
        })
        .or_else(|| channel.first_datacenter_key().map(str::to_string))
    else {
        error!("no datacenter configured, cannot address the DLQ, offset left uncommitted");
        return;
    };

    let Some(topic) = route::dlq_topic(channel, &datacenter) else {
        warn!("dead-lettering disabled for channel, offset left uncommitted");
        return;
    };

    // Diagnostics ride on top of the original inbound headers; the snapshot
    // wins over the live map because later stages rewrite `messageSchema`.
    let mut dlq_headers = env
        .header_snapshot
        .clone()
        .unwrap_or_else(|| env.headers.clone());
    dlq_headers.set(headers::DLQ_SOURCE_TOPIC, &env.source_topic);
    dlq_headers.set(headers::DLQ_ERROR_KIND, err.kind());
    dlq_headers.set(headers::DLQ_ERROR_MESSAGE, &err.to_string());
    dlq_headers.set(headers::DLQ_ERROR_CLASS, std::any::type_name::<GatewayError>());

    match publisher
        .publish(&topic, env.key.as_deref(), &dlq_headers, &env.payload)
        .await
    {
        Ok(()) => {
            env.state = EnvelopeState::DlqProduced;
            commit::commit(env);
        }
        Err(publish_err) => {
            let dlq_err = GatewayError::DlqProduce(publish_err.to_string());
            error!(
                topic = %topic,
                kind = dlq_err.kind(),
                error = %dlq_err,
                "DLQ produce failed, offset left uncommitted for re-delivery"
            );
        }
    }
}
