pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod explore;
pub mod index;
pub mod linalg;
pub mod neighbors;
pub mod projection;
pub mod scorer;
pub mod tokenizer;
pub mod vectorizer;

pub use cache::{Artifact, ArtifactStore, CacheOutcome, DirStore, Manifest, MemoryStore};
pub use config::EngineConfig;
pub use corpus::{Corpus, DocId, Document, RawDocument};
pub use error::{Result, ScoutError};
pub use explore::{MapNode, MapView};
pub use index::SearchIndex;
pub use linalg::{DenseMatrix, SparseVector};
pub use neighbors::{NeighborEntry, NeighborGraph};
pub use projection::Projection;
pub use scorer::{Hit, Ranked};
pub use vectorizer::{TermId, Vectorizer, Vocabulary};
