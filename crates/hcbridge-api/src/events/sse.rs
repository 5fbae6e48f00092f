// Server-sent events over HTTP.
//
// Opens `GET .../events` with the stream client and decodes the body with
// `eventsource-stream`. HTTP failures before the first byte go through the
// same status mapping as the request/response API.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;

use super::reader::{FrameSession, FrameSource};
use super::RawFrame;
use crate::client::{HomeConnectClient, check_status};
use crate::error::{Error, RequestContext};

/// [`FrameSource`] backed by the cloud's SSE endpoint.
#[derive(Clone)]
pub struct SseSource {
    client: HomeConnectClient,
}

impl SseSource {
    pub fn new(client: HomeConnectClient) -> Self {
        Self { client }
    }
}

impl FrameSource for SseSource {
    async fn open(&self, target: Option<&str>) -> Result<FrameSession, Error> {
        let url = self.client.events_url(target)?;
        let mut context = RequestContext::new(url.as_str());
        tracing::debug!(url = %url, "Opening event stream");

        let resp = self
            .client
            .stream_http()
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Stream {
                reason: e.to_string(),
                context: context.clone(),
            })?;
        context.status = Some(resp.status().as_u16());
        let resp = check_status(resp).await?;

        let frame_context = context.clone();
        let frames = resp
            .bytes_stream()
            .eventsource()
            .map(move |item| match item {
                Ok(event) => Ok(RawFrame::from(event)),
                Err(e) => Err(Error::Stream {
                    reason: e.to_string(),
                    context: frame_context.clone(),
                }),
            })
            .boxed();

        Ok(FrameSession { context, frames })
    }
}
