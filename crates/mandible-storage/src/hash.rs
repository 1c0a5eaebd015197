//! Background generator of store-unique upload identifiers.
//!
//! A producer task continuously builds fixed-length alphanumeric candidates,
//! probes the backing store for collisions and hands verified ids to request
//! tasks over a one-slot channel. The store stays authoritative: an id is
//! only offered after `exists` returned false for it.

use std::sync::Arc;

use rand::RngCore;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::object::StoreObject;
use crate::traits::ImageStore;

/// How many random bytes the producer draws per round.
const DRAW_LEN: usize = 10;

pub struct HashGenerator {
    receiver: Mutex<mpsc::Receiver<String>>,
    producer: JoinHandle<()>,
}

impl HashGenerator {
    pub fn new(store: Arc<dyn ImageStore>, length: usize) -> HashGenerator {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(produce(store, length, tx));

        HashGenerator {
            receiver: Mutex::new(rx),
            producer,
        }
    }

    /// Receive the next verified id. Returns `None` only after [`stop`]
    /// (Self::stop) has been called.
    pub async fn get(&self) -> Option<String> {
        self.receiver.lock().await.recv().await
    }

    /// Abort the producer task. Pending `get` calls drain the channel and
    /// then observe `None`.
    pub fn stop(&self) {
        self.producer.abort();
    }
}

async fn produce(store: Arc<dyn ImageStore>, length: usize, tx: mpsc::Sender<String>) {
    loop {
        let id = next_candidate(length);

        let probe = StoreObject::original(id.clone(), "");
        match store.exists(&probe).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                // Never hand out an unverified id; retry with a new draw.
                tracing::warn!(error = %err, "hash existence probe failed");
                continue;
            }
        }

        if tx.send(id).await.is_err() {
            // Consumer side is gone; the generator is done.
            break;
        }
    }
}

fn next_candidate(length: usize) -> String {
    let mut id = String::with_capacity(length);

    while id.len() < length {
        let mut draw = [0u8; DRAW_LEN];
        rand::thread_rng().fill_bytes(&mut draw);

        for byte in draw {
            if id.len() == length {
                break;
            }

            // A raw byte is uniform over [0, 256) but the accepted
            // codepoints all live below 128. Dropping the high bit halves
            // the reject rate without skewing the accepted values.
            let byte = byte >> 1;

            if byte.is_ascii_alphanumeric() {
                id.push(byte as char);
            }
        }
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn candidates_are_alphanumeric_and_sized() {
        for length in [1, 7, 32] {
            let id = next_candidate(length);
            assert_eq!(id.len(), length);
            assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()), "{:?}", id);
        }
    }

    #[tokio::test]
    async fn get_yields_verified_ids() {
        let store = Arc::new(InMemoryStore::new());
        let generator = HashGenerator::new(store.clone(), 7);

        for _ in 0..16 {
            let id = generator.get().await.unwrap();
            assert_eq!(id.len(), 7);
            assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));
            let probe = StoreObject::original(id, "");
            assert!(!store.exists(&probe).await.unwrap());
        }

        generator.stop();
    }

    #[tokio::test]
    async fn never_returns_a_seeded_collision() {
        // With length 1 the 62-value space makes collisions frequent enough
        // to exercise the retry path.
        let store = Arc::new(InMemoryStore::new());
        store.insert("abcdefg", &b"taken"[..]);
        for c in 'a'..='m' {
            store.insert(c.to_string(), &b"taken"[..]);
        }

        let generator = HashGenerator::new(store.clone(), 1);
        for _ in 0..32 {
            let id = generator.get().await.unwrap();
            assert_ne!(id, "abcdefg");
            let probe = StoreObject::original(id, "");
            assert!(!store.exists(&probe).await.unwrap());
        }

        let seven = HashGenerator::new(store.clone(), 7);
        for _ in 0..8 {
            assert_ne!(seven.get().await.unwrap(), "abcdefg");
        }

        generator.stop();
        seven.stop();
    }

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let store = Arc::new(InMemoryStore::new());
        let generator = HashGenerator::new(store, 7);

        // Drain whatever is in flight, then stop; the channel closes.
        let _ = generator.get().await;
        generator.stop();

        // The producer may have parked one value in the channel before the
        // abort landed; after at most one more receive the stream ends.
        let mut remaining = 0;
        while generator.get().await.is_some() {
            remaining += 1;
            assert!(remaining <= 1, "channel kept producing after stop");
        }
    }
}
