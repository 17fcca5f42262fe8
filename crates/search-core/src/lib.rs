pub mod error;
pub mod fingerprint;
pub mod fusion;
pub mod graph;
pub mod lexical;
pub mod retrieval;
pub mod vector;

pub use error::MalformedPayload;
pub use fingerprint::{Fingerprint, canonical_key, fingerprint};
pub use fusion::{DEFAULT_RRF_K, ScoredId, rrf_fuse};
pub use graph::{GraphStore, LedgerGraph};
pub use lexical::{TantivyLedgerIndex, TransactionStore};
pub use retrieval::RetrievalDefaults;
pub use vector::{MemoryVectorIndex, QdrantVectorStore, ScoredRecord, VectorIndex, VectorSearchConfig};
