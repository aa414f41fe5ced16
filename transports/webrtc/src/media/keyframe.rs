//! Periodic keyframe-request interceptor
//!
//! Sends an RTCP Picture Loss Indication for every bound remote video stream
//! at a fixed interval, so the sender produces regular keyframes and the
//! recorded IVF file stays seekable.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};
use webrtc::interceptor::stream_info::StreamInfo;
use webrtc::interceptor::{
    Attributes, Error as InterceptorError, Interceptor, InterceptorBuilder, RTCPReader,
    RTCPWriter, RTPReader, RTPWriter,
};
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;

/// Builder registered on the interceptor registry; one interceptor per peer connection
pub struct KeyframeRequestBuilder {
    interval: Duration,
}

impl KeyframeRequestBuilder {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl InterceptorBuilder for KeyframeRequestBuilder {
    fn build(&self, _id: &str) -> Result<Arc<dyn Interceptor + Send + Sync>, InterceptorError> {
        Ok(Arc::new(KeyframeRequester::new(self.interval)))
    }
}

struct Inner {
    interval: Duration,
    ssrcs: Mutex<HashSet<u32>>,
}

impl Inner {
    /// Write one PLI per tracked video SSRC. Returns the number requested.
    async fn request_keyframes(&self, writer: &Arc<dyn RTCPWriter + Send + Sync>) -> usize {
        let ssrcs: Vec<u32> = self.ssrcs.lock().await.iter().copied().collect();
        if ssrcs.is_empty() {
            return 0;
        }

        let packets: Vec<Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>> = ssrcs
            .iter()
            .map(|&media_ssrc| {
                Box::new(PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc,
                }) as Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>
            })
            .collect();

        if let Err(e) = writer.write(&packets, &Attributes::new()).await {
            warn!("Failed to send keyframe request: {}", e);
            return 0;
        }

        trace!(count = packets.len(), "Sent keyframe requests");
        packets.len()
    }
}

/// Interceptor that asks remote video senders for a keyframe on a fixed period
pub struct KeyframeRequester {
    inner: Arc<Inner>,
    started: AtomicBool,
    close_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl KeyframeRequester {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                interval,
                ssrcs: Mutex::new(HashSet::new()),
            }),
            started: AtomicBool::new(false),
            close_tx: Mutex::new(None),
        }
    }

    /// SSRCs currently receiving keyframe requests
    pub async fn tracked_ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = self.inner.ssrcs.lock().await.iter().copied().collect();
        ssrcs.sort_unstable();
        ssrcs
    }

    async fn run(
        inner: Arc<Inner>,
        writer: Arc<dyn RTCPWriter + Send + Sync>,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(inner.interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = close_rx.recv() => {
                    debug!("Keyframe request loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    inner.request_keyframes(&writer).await;
                }
            }
        }
    }
}

fn wants_keyframes(info: &StreamInfo) -> bool {
    info.mime_type.to_ascii_lowercase().starts_with("video/")
        || info
            .rtcp_feedback
            .iter()
            .any(|fb| fb.typ == "nack" && fb.parameter == "pli")
}

#[async_trait]
impl Interceptor for KeyframeRequester {
    async fn bind_rtcp_reader(
        &self,
        reader: Arc<dyn RTCPReader + Send + Sync>,
    ) -> Arc<dyn RTCPReader + Send + Sync> {
        reader
    }

    async fn bind_rtcp_writer(
        &self,
        writer: Arc<dyn RTCPWriter + Send + Sync>,
    ) -> Arc<dyn RTCPWriter + Send + Sync> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let (close_tx, close_rx) = mpsc::channel(1);
            *self.close_tx.lock().await = Some(close_tx);
            tokio::spawn(Self::run(
                Arc::clone(&self.inner),
                Arc::clone(&writer),
                close_rx,
            ));
        }
        writer
    }

    async fn bind_local_stream(
        &self,
        _info: &StreamInfo,
        writer: Arc<dyn RTPWriter + Send + Sync>,
    ) -> Arc<dyn RTPWriter + Send + Sync> {
        writer
    }

    async fn unbind_local_stream(&self, _info: &StreamInfo) {}

    async fn bind_remote_stream(
        &self,
        info: &StreamInfo,
        reader: Arc<dyn RTPReader + Send + Sync>,
    ) -> Arc<dyn RTPReader + Send + Sync> {
        if wants_keyframes(info) {
            debug!(ssrc = info.ssrc, mime_type = %info.mime_type, "Requesting periodic keyframes");
            self.inner.ssrcs.lock().await.insert(info.ssrc);
        }
        reader
    }

    async fn unbind_remote_stream(&self, info: &StreamInfo) {
        self.inner.ssrcs.lock().await.remove(&info.ssrc);
    }

    async fn close(&self) -> Result<(), InterceptorError> {
        if let Some(close_tx) = self.close_tx.lock().await.take() {
            let _ = close_tx.send(()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use webrtc::interceptor::noop::NoOp;

    #[derive(Default)]
    struct CapturingWriter {
        media_ssrcs: StdMutex<Vec<u32>>,
    }

    #[async_trait]
    impl RTCPWriter for CapturingWriter {
        async fn write(
            &self,
            pkts: &[Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>],
            _attributes: &Attributes,
        ) -> Result<usize, InterceptorError> {
            let mut seen = self.media_ssrcs.lock().unwrap();
            for pkt in pkts {
                if let Some(pli) = pkt.as_any().downcast_ref::<PictureLossIndication>() {
                    seen.push(pli.media_ssrc);
                }
            }
            Ok(0)
        }
    }

    fn stream(ssrc: u32, mime_type: &str) -> StreamInfo {
        StreamInfo {
            ssrc,
            mime_type: mime_type.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_video_streams_are_tracked() {
        let requester = KeyframeRequester::new(Duration::from_secs(3));
        let reader: Arc<dyn RTPReader + Send + Sync> = Arc::new(NoOp);

        requester
            .bind_remote_stream(&stream(10, "audio/opus"), Arc::clone(&reader))
            .await;
        requester
            .bind_remote_stream(&stream(20, "video/VP8"), Arc::clone(&reader))
            .await;

        assert_eq!(requester.tracked_ssrcs().await, vec![20]);

        requester.unbind_remote_stream(&stream(20, "video/VP8")).await;
        assert!(requester.tracked_ssrcs().await.is_empty());
    }

    #[tokio::test]
    async fn test_request_keyframes_writes_one_pli_per_ssrc() {
        let requester = KeyframeRequester::new(Duration::from_secs(3));
        let reader: Arc<dyn RTPReader + Send + Sync> = Arc::new(NoOp);
        requester
            .bind_remote_stream(&stream(7, "video/vp8"), Arc::clone(&reader))
            .await;
        requester
            .bind_remote_stream(&stream(9, "video/VP8"), reader)
            .await;

        let capture = Arc::new(CapturingWriter::default());
        let writer: Arc<dyn RTCPWriter + Send + Sync> = capture.clone();
        let sent = requester.inner.request_keyframes(&writer).await;

        assert_eq!(sent, 2);
        let mut seen = capture.media_ssrcs.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![7, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_on_interval_until_closed() {
        let requester = KeyframeRequester::new(Duration::from_millis(3000));
        let reader: Arc<dyn RTPReader + Send + Sync> = Arc::new(NoOp);
        requester
            .bind_remote_stream(&stream(42, "video/VP8"), reader)
            .await;

        let capture = Arc::new(CapturingWriter::default());
        requester.bind_rtcp_writer(capture.clone()).await;

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(capture.media_ssrcs.lock().unwrap().len(), 2);

        requester.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(capture.media_ssrcs.lock().unwrap().len(), 2);
    }
}
