use tokio::io::{duplex, DuplexStream};

use crate::FramedPortal;

/// Two portals connected back to back through an in-process pipe.
///
/// `max_buf_size` bounds the bytes buffered in each direction.
pub fn memory_pair(max_buf_size: usize) -> (FramedPortal<DuplexStream>, FramedPortal<DuplexStream>) {
    let (a, b) = duplex(max_buf_size);
    (FramedPortal::new(a, 0), FramedPortal::new(b, 0))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};

    use super::*;

    #[tokio::test]
    async fn test_memory_pair_keeps_frame_boundaries() {
        let (mut a, mut b) = memory_pair(1024);
        a.send(Bytes::from_static(b"first")).await.unwrap();
        a.send(Bytes::from_static(b"")).await.unwrap();
        a.send(Bytes::from_static(b"third")).await.unwrap();

        assert_eq!(b.next().await.unwrap().unwrap(), Bytes::from_static(b"first"));
        assert_eq!(b.next().await.unwrap().unwrap(), Bytes::new());
        assert_eq!(b.next().await.unwrap().unwrap(), Bytes::from_static(b"third"));

        b.send(Bytes::from_static(b"back")).await.unwrap();
        assert_eq!(a.next().await.unwrap().unwrap(), Bytes::from_static(b"back"));
    }

    #[tokio::test]
    async fn test_memory_pair_end_of_stream() {
        let (mut a, b) = memory_pair(64);
        drop(b);
        assert!(a.next().await.is_none());
    }
}
