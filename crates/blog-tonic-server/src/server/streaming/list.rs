use crate::server::{store::BlogCursor, telemetry::increment_blogs_streamed};
use blog_tonic_core::{Error, proto::ListBlogResponse};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drains a store cursor into the `ListBlog` response channel.
///
/// Each record is sent (waiting for channel capacity) before the cursor is
/// advanced, so a slow client applies backpressure all the way to the store.
/// The cursor is owned by this function and dropped, which releases it, on
/// every exit path.
///
/// # Arguments
///
/// - `cursor`: Open cursor over the collection.
/// - `resp_tx`: Channel feeding the gRPC response stream.
/// - `abort`: Service abort token, cancelled when shutdown gives up draining.
///
/// # Behavior
///
/// - Returns the number of records sent once the cursor is exhausted.
/// - A cursor fault (iteration or decode) is forwarded to the client after the
///   records already sent, then returned.
/// - If the client goes away, either while the cursor is waiting or on a
///   send, returns [`Error::ChannelError`] without touching the cursor again.
/// - If `abort` fires, whether the cursor or a send is pending, makes a best
///   effort to surface [`Error::ServiceShutdown`] to the client without
///   waiting for channel capacity, and returns it.
pub async fn forward_blogs(
    mut cursor: BlogCursor,
    resp_tx: mpsc::Sender<Result<ListBlogResponse, Status>>,
    abort: CancellationToken,
) -> Result<usize, Error> {
    let mut sent = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = abort.cancelled() => {
                return Err(abandon(&resp_tx, Error::ServiceShutdown));
            }
            () = resp_tx.closed() => {
                return Err(Error::ChannelError {
                    context: format!("client disconnected after {sent} blogs"),
                });
            }
            next = cursor.next() => next,
        };

        match next {
            Some(Ok(post)) => {
                let msg = ListBlogResponse {
                    blog: Some(post.into()),
                };
                // A client that stops reading blocks the send; abort still
                // has to get through.
                tokio::select! {
                    biased;
                    () = abort.cancelled() => {
                        return Err(abandon(&resp_tx, Error::ServiceShutdown));
                    }
                    res = resp_tx.send(Ok(msg)) => {
                        // If the send fails the client is gone; return
                        // immediately so the error can be tracked upstream.
                        if let Err(e) = res {
                            return Err(Error::ChannelError {
                                context: format!("Failed to forward blog: {e}"),
                            });
                        }
                    }
                }
                sent += 1;
                increment_blogs_streamed();
            }
            Some(Err(e)) => return Err(fail(&resp_tx, e, &abort).await),
            None => return Ok(sent),
        }
    }
}

/// Best effort to surface `err` to the client, who may have disconnected too.
/// Waits for channel capacity unless `abort` fires first.
async fn fail(
    resp_tx: &mpsc::Sender<Result<ListBlogResponse, Status>>,
    err: Error,
    abort: &CancellationToken,
) -> Error {
    tokio::select! {
        biased;
        () = abort.cancelled() => abandon(resp_tx, err),
        res = resp_tx.send(Err(err.clone().into())) => {
            if let Err(e) = res {
                tracing::debug!("Failed to forward err: {e}");
            }
            err
        }
    }
}

/// Like [`fail`], but never waits: a full channel drops the error.
fn abandon(resp_tx: &mpsc::Sender<Result<ListBlogResponse, Status>>, err: Error) -> Error {
    if let Err(e) = resp_tx.try_send(Err(err.clone().into())) {
        tracing::debug!("Failed to forward err: {e}");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use blog_tonic_core::types::{BlogId, BlogPost, NewBlogPost};
    use futures::stream;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use tonic::Code;

    fn post(title: &str) -> Result<BlogPost, Error> {
        Ok(NewBlogPost {
            author_id: "a".into(),
            title: title.into(),
            content: "c".into(),
        }
        .with_id(BlogId::new()))
    }

    /// Flags when the wrapped cursor is dropped.
    fn probed(
        items: Vec<Result<BlogPost, Error>>,
    ) -> (BlogCursor, Arc<AtomicBool>) {
        struct Probe(Arc<AtomicBool>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let probe = Probe(Arc::clone(&released));
        let cursor = stream::iter(items).map(move |item| {
            let _keep = &probe;
            item
        });
        (Box::pin(cursor), released)
    }

    #[tokio::test]
    async fn forwards_every_record_in_order() {
        let (cursor, released) = probed(vec![post("one"), post("two"), post("three")]);
        let (tx, mut rx) = mpsc::channel(1);

        let task = tokio::spawn(forward_blogs(cursor, tx, CancellationToken::new()));

        let mut titles = Vec::new();
        while let Some(msg) = rx.recv().await {
            titles.push(msg.unwrap().blog.unwrap().title);
        }

        assert_eq!(task.await.unwrap(), Ok(3));
        assert_eq!(titles, ["one", "two", "three"]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cursor_fault_follows_the_records_already_sent() {
        let (cursor, released) = probed(vec![
            post("one"),
            Err(Error::decode("bad document")),
            post("never"),
        ]);
        let (tx, mut rx) = mpsc::channel(4);

        let res = forward_blogs(cursor, tx, CancellationToken::new()).await;
        assert!(matches!(res, Err(Error::Decode { .. })));
        assert!(released.load(Ordering::SeqCst));

        assert_eq!(rx.recv().await.unwrap().unwrap().blog.unwrap().title, "one");
        assert_eq!(rx.recv().await.unwrap().unwrap_err().code(), Code::Internal);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_disconnect_ends_the_stream() {
        let (cursor, released) = probed(vec![post("one"), post("two")]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let res = forward_blogs(cursor, tx, CancellationToken::new()).await;
        assert!(matches!(res, Err(Error::ChannelError { .. })));
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(Status::from(res.unwrap_err()).code(), Code::Unknown);
    }

    #[tokio::test]
    async fn abort_ends_a_stalled_stream() {
        let cursor: BlogCursor = Box::pin(stream::pending::<Result<BlogPost, Error>>());
        let (tx, mut rx) = mpsc::channel(1);
        let abort = CancellationToken::new();
        abort.cancel();

        let res = forward_blogs(cursor, tx, abort).await;
        assert_eq!(res, Err(Error::ServiceShutdown));
        assert_eq!(rx.recv().await.unwrap().unwrap_err().code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn abort_ends_a_stream_blocked_on_a_stuck_client() {
        let (cursor, released) = probed((0..5).map(|i| post(&format!("post {i}"))).collect());
        let (tx, rx) = mpsc::channel(1);
        let abort = CancellationToken::new();

        let task = tokio::spawn(forward_blogs(cursor, tx, abort.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        abort.cancel();
        let res = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("still sending after abort")
            .unwrap();

        assert_eq!(res, Err(Error::ServiceShutdown));
        assert!(released.load(Ordering::SeqCst));
        // The receiver is alive throughout; it just never reads.
        drop(rx);
    }

    #[tokio::test]
    async fn abort_ends_a_cursor_fault_that_cannot_be_delivered() {
        let (cursor, released) = probed(vec![
            post("one"),
            Err(Error::decode("bad document")),
        ]);
        let (tx, rx) = mpsc::channel(1);
        let abort = CancellationToken::new();

        let task = tokio::spawn(forward_blogs(cursor, tx, abort.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        abort.cancel();

        let res = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("still sending after abort")
            .unwrap();
        assert!(matches!(res, Err(Error::Decode { .. })));
        assert!(released.load(Ordering::SeqCst));
        drop(rx);
    }

    #[tokio::test]
    async fn empty_collection_sends_nothing() {
        let (cursor, released) = probed(Vec::new());
        let (tx, mut rx) = mpsc::channel(1);

        assert_eq!(forward_blogs(cursor, tx, CancellationToken::new()).await, Ok(0));
        assert!(rx.recv().await.is_none());
        assert!(released.load(Ordering::SeqCst));
    }
}
