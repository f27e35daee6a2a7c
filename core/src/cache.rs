use crate::error::ScoutError;
use crate::index::SearchIndex;
use crate::linalg::{DenseMatrix, SparseVector};
use crate::neighbors::NeighborGraph;
use crate::projection::{Projection, ProjectionFile};
use crate::vectorizer::Vectorizer;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, remove_file, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Vectorizer,
    SparseMatrix,
    Projection,
    DenseVectors,
    NeighborGraph,
    Manifest,
}

impl Artifact {
    /// Payload artifacts; the manifest is handled separately and written last.
    pub const PAYLOAD: [Artifact; 5] = [
        Artifact::Vectorizer,
        Artifact::SparseMatrix,
        Artifact::Projection,
        Artifact::DenseVectors,
        Artifact::NeighborGraph,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Vectorizer => "tfidf_vectorizer.bin.gz",
            Artifact::SparseMatrix => "tfidf_matrix.bin",
            Artifact::Projection => "svd_model.bin.gz",
            Artifact::DenseVectors => "doc_vectors_f16.bin",
            Artifact::NeighborGraph => "similarities.bin.gz",
            Artifact::Manifest => "manifest.json",
        }
    }
}

/// Whole-artifact durable storage keyed by artifact name.
pub trait ArtifactStore: Send + Sync {
    fn read(&self, artifact: Artifact) -> Result<Vec<u8>>;
    fn write(&self, artifact: Artifact, bytes: &[u8]) -> Result<()>;
    fn contains(&self, artifact: Artifact) -> bool;
    /// Delete an artifact; removing one that is absent is not an error.
    fn remove(&self, artifact: Artifact) -> Result<()>;
}

pub struct ArtifactPaths {
    pub root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn of(&self, artifact: Artifact) -> PathBuf { self.root.join(artifact.file_name()) }
}

/// One file per artifact under a cache directory.
pub struct DirStore {
    paths: ArtifactPaths,
}

impl DirStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { paths: ArtifactPaths::new(root) }
    }

    pub fn root(&self) -> &Path { &self.paths.root }
}

impl ArtifactStore for DirStore {
    fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        let path = self.paths.of(artifact);
        let mut f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, artifact: Artifact, bytes: &[u8]) -> Result<()> {
        create_dir_all(&self.paths.root)?;
        let path = self.paths.of(artifact);
        let mut f = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(bytes)?;
        Ok(())
    }

    fn contains(&self, artifact: Artifact) -> bool { self.paths.of(artifact).is_file() }

    fn remove(&self, artifact: Artifact) -> Result<()> {
        let path = self.paths.of(artifact);
        match remove_file(&path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(err).with_context(|| format!("removing {}", path.display()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<Artifact, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(&artifact)
            .cloned()
            .with_context(|| format!("artifact {} not stored", artifact.file_name()))
    }

    fn write(&self, artifact: Artifact, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(artifact, bytes.to_vec());
        Ok(())
    }

    fn contains(&self, artifact: Artifact) -> bool { self.blobs.read().contains_key(&artifact) }

    fn remove(&self, artifact: Artifact) -> Result<()> {
        self.blobs.write().remove(&artifact);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub content_hash: String,
    pub num_docs: usize,
    pub vocabulary_size: usize,
    pub latent_dim: usize,
    pub created_at: String,
    pub artifacts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    Loaded,
    Rebuilt { reason: String, persisted: bool },
}

#[derive(Serialize, Deserialize)]
struct DenseFile {
    dim: usize,
    rows: usize,
    bits: Vec<u16>,
}

/// Everything derived from a corpus snapshot.
pub struct Artifacts {
    pub vectorizer: Vectorizer,
    pub sparse: Vec<SparseVector>,
    pub projection: Projection,
    pub dense: DenseMatrix,
    pub neighbors: NeighborGraph,
}

fn encode_gz<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    bincode::serialize_into(&mut encoder, value)?;
    Ok(encoder.finish()?)
}

fn decode_gz<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize_from(GzDecoder::new(bytes))?)
}

pub fn save_index(index: &SearchIndex, store: &dyn ArtifactStore) -> Result<Manifest> {
    // An interrupted save must not leave the previous manifest vouching for new payloads.
    store.remove(Artifact::Manifest).context("invalidating previous manifest")?;
    store.write(Artifact::Vectorizer, &encode_gz(index.vectorizer())?)?;
    store.write(Artifact::SparseMatrix, &bincode::serialize(index.sparse_rows())?)?;
    store.write(Artifact::Projection, &encode_gz(&index.projection().to_file())?)?;
    let dense = DenseFile { dim: index.dense().dim(), rows: index.dense().rows(), bits: index.dense().to_f16_bits() };
    store.write(Artifact::DenseVectors, &bincode::serialize(&dense)?)?;
    store.write(Artifact::NeighborGraph, &encode_gz(index.neighbors())?)?;

    let manifest = Manifest {
        version: FORMAT_VERSION,
        content_hash: index.content_hash().to_string(),
        num_docs: index.corpus().len(),
        vocabulary_size: index.vectorizer().n_features(),
        latent_dim: index.projection().dim(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        artifacts: Artifact::PAYLOAD
            .iter()
            .map(|a| (format!("{a:?}"), a.file_name().to_string()))
            .collect(),
    };
    // A manifest only appears once every payload is on disk.
    store.write(Artifact::Manifest, serde_json::to_string_pretty(&manifest)?.as_bytes())?;
    Ok(manifest)
}

pub fn read_manifest(store: &dyn ArtifactStore) -> Result<Manifest> {
    let bytes = store.read(Artifact::Manifest)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The stored manifest, provided it describes `expected_hash` in the current format.
pub fn check_manifest(store: &dyn ArtifactStore, expected_hash: &str) -> std::result::Result<Manifest, ScoutError> {
    let missing: Vec<&str> = Artifact::PAYLOAD
        .iter()
        .chain(std::iter::once(&Artifact::Manifest))
        .filter(|a| !store.contains(**a))
        .map(|a| a.file_name())
        .collect();
    if !missing.is_empty() {
        return Err(ScoutError::CacheMismatch {
            expected: expected_hash.to_string(),
            found: format!("missing {}", missing.join(", ")),
        });
    }
    let manifest = read_manifest(store).map_err(|e| ScoutError::Serialization(e.to_string()))?;
    if manifest.version != FORMAT_VERSION || manifest.content_hash != expected_hash {
        return Err(ScoutError::CacheMismatch {
            expected: expected_hash.to_string(),
            found: format!("{} (format v{})", manifest.content_hash, manifest.version),
        });
    }
    Ok(manifest)
}

pub fn load_artifacts(store: &dyn ArtifactStore) -> Result<Artifacts> {
    let vectorizer: Vectorizer = decode_gz(&store.read(Artifact::Vectorizer)?).context("decoding vectorizer")?;
    let sparse: Vec<SparseVector> =
        bincode::deserialize(&store.read(Artifact::SparseMatrix)?).context("decoding sparse matrix")?;
    let projection_file: ProjectionFile = decode_gz(&store.read(Artifact::Projection)?).context("decoding projection")?;
    let dense_file: DenseFile =
        bincode::deserialize(&store.read(Artifact::DenseVectors)?).context("decoding dense vectors")?;
    let dense = DenseMatrix::from_f16_bits(dense_file.dim, dense_file.rows, &dense_file.bits).with_context(|| {
        format!(
            "dense vectors hold {} values, expected {} rows of {}",
            dense_file.bits.len(),
            dense_file.rows,
            dense_file.dim
        )
    })?;
    let neighbors: NeighborGraph = decode_gz(&store.read(Artifact::NeighborGraph)?).context("decoding neighbor graph")?;
    Ok(Artifacts {
        vectorizer,
        sparse,
        projection: Projection::from_file(projection_file),
        dense,
        neighbors,
    })
}
