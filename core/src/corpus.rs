use crate::error::{Result, ScoutError};
use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub type DocId = u32;

pub const DEFAULT_EXPERIENCE_LEVEL: &str = "Not specified";

/// A job posting as it arrives from the ingestion pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default, deserialize_with = "salary")]
    pub salary_min: Option<u64>,
    #[serde(default, deserialize_with = "salary")]
    pub salary_max: Option<u64>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SalaryValue {
    Int(u64),
    Float(f64),
}

// Scrapers emit integers, floats or null for salaries.
fn salary<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<u64>, D::Error> {
    let value: Option<SalaryValue> = Option::deserialize(de)?;
    Ok(match value {
        Some(SalaryValue::Int(n)) => Some(n),
        Some(SalaryValue::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u64),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
    pub skills: Vec<String>,
    pub salary_min: Option<u64>,
    pub salary_max: Option<u64>,
    pub experience_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Document {
    fn from_raw(id: DocId, raw: RawDocument) -> Self {
        Self {
            id,
            title: raw.title,
            description: raw.description,
            skills: raw.skills.unwrap_or_default(),
            salary_min: raw.salary_min,
            salary_max: raw.salary_max,
            experience_level: raw
                .experience_level
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EXPERIENCE_LEVEL.to_string()),
            company: raw.company,
            location: raw.location,
        }
    }

    /// Lower-cased `title description skills...` text used for vocabulary fitting.
    pub fn blob(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.skills.join(" ")).to_lowercase()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.blob().split_whitespace().map(str::to_string).collect()
    }

    /// Midpoint of the advertised range, or whichever bound is present, or 0.
    pub fn median_salary(&self) -> f64 {
        match (self.salary_min, self.salary_max) {
            (Some(lo), Some(hi)) => (lo as f64 + hi as f64) / 2.0,
            (Some(v), None) | (None, Some(v)) => v as f64,
            (None, None) => 0.0,
        }
    }

    pub fn salary_range(&self) -> String {
        format!(
            "${} - ${}",
            thousands(self.salary_min.unwrap_or(0)),
            thousands(self.salary_max.unwrap_or(0))
        )
    }

    pub fn title_matches(&self, query: &str) -> bool {
        self.title.to_lowercase() == query.to_lowercase()
    }

    /// Case-insensitive substring match over title, description and skills.
    /// `needle` must already be lower-cased.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.skills.iter().any(|s| s.to_lowercase().contains(needle))
    }
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    docs: Vec<Document>,
}

impl Corpus {
    pub fn new(records: Vec<RawDocument>) -> Self {
        let docs = records
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Document::from_raw(i as DocId, raw))
            .collect();
        Self { docs }
    }

    /// Load a JSON array, a JSONL file, or every `*.json`/`*.jsonl` under a directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fail = |reason: String| ScoutError::CorpusLoad { path: path.to_path_buf(), reason };

        let mut files: Vec<PathBuf> = Vec::new();
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                    files.push(p.to_path_buf());
                }
            }
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            return Err(fail("no such file or directory".into()));
        }

        let mut records = Vec::new();
        for file in files {
            let batch = if extension(&file) == Some("jsonl") { read_jsonl(&file) } else { read_json(&file) };
            records.extend(batch.map_err(|e| fail(format!("{}: {e}", file.display())))?);
        }
        let corpus = Self::new(records);
        tracing::info!(path = %path.display(), num_docs = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    /// Like [`Corpus::load`], but an unusable source yields an empty corpus so
    /// the service can still start.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(corpus) => corpus,
            Err(err) => {
                tracing::error!(error = %err, "corpus unavailable, continuing with an empty corpus");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.docs.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn blobs(&self) -> Vec<String> {
        self.docs.iter().map(Document::blob).collect()
    }

    /// First document whose title equals `query` ignoring case.
    pub fn find_title_ignore_case(&self, query: &str) -> Option<DocId> {
        let q = query.to_lowercase();
        self.docs.iter().find(|d| d.title.to_lowercase() == q).map(|d| d.id)
    }

    /// First document whose title equals `title` exactly.
    pub fn find_title(&self, title: &str) -> Option<DocId> {
        self.docs.iter().find(|d| d.title == title).map(|d| d.id)
    }

    /// SHA-1 over the `(title, description)` pairs in corpus order.
    pub fn content_hash(&self) -> String {
        #[derive(Serialize)]
        struct Key<'a> {
            title: &'a str,
            description: &'a str,
        }
        let keys: Vec<Key<'_>> = self
            .docs
            .iter()
            .map(|d| Key { title: &d.title, description: &d.description })
            .collect();
        let mut hasher = Sha1::new();
        // Serializing plain string structs cannot fail.
        hasher.update(serde_json::to_vec(&keys).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

fn read_jsonl(file: &Path) -> Result<Vec<RawDocument>> {
    let reader = BufReader::new(File::open(file)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn read_json(file: &Path) -> Result<Vec<RawDocument>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(json)?),
        _ => Err(ScoutError::Serialization("expected a JSON array of job records".into())),
    }
}
