//! Row streams for incrementally consumed query results

use crate::{Result, Row};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Sending half used by drivers to feed a `RowStream`
pub type RowSender = mpsc::Sender<Result<Row>>;

/// Rows of a query, delivered one at a time.
///
/// The producer stops once the stream is dropped. After an error is yielded
/// the stream is finished.
pub struct RowStream {
    columns: Vec<String>,
    rx: mpsc::Receiver<Result<Row>>,
    finished: bool,
}

impl RowStream {
    /// Create a stream and the sender that feeds it
    pub fn channel(columns: Vec<String>, capacity: usize) -> (RowSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                columns,
                rx,
                finished: false,
            },
        )
    }

    /// Create a stream over rows that are already materialized; the channel
    /// is sized to hold all of them.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let (tx, stream) = Self::channel(columns, rows.len());
        for row in rows {
            let _ = tx.try_send(Ok(row));
        }
        stream
    }

    /// Column names of the result
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch the next row, `None` once the result is exhausted
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if self.finished {
            return None;
        }
        let item = self.rx.recv().await;
        self.observe(&item);
        item
    }

    fn observe(&mut self, item: &Option<Result<Row>>) {
        match item {
            None | Some(Err(_)) => {
                self.finished = true;
                self.rx.close();
            }
            Some(Ok(_)) => {}
        }
    }
}

impl Stream for RowStream {
    type Item = Result<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(item) => {
                self.observe(&item);
                Poll::Ready(item)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .field("finished", &self.finished)
            .finish()
    }
}
