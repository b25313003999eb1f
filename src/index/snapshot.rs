//! Binary index snapshot
//!
//! Layout: header `{magic "QIDX", version u16, dimension u32, metric u8,
//! count u64}` followed by `count` chunk records. Strings are
//! u32-length-prefixed UTF-8, vectors are dimension x f32 little-endian.
//! Only live chunks are written; tombstones never survive a snapshot.

use super::{Chunk, ChunkId, DocumentId, DistanceMetric, IndexError, IndexParams, VectorIndex};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

const MAGIC: &[u8; 4] = b"QIDX";
const VERSION: u16 = 1;

fn metric_tag(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Cosine => 0,
        DistanceMetric::Euclidean => 1,
    }
}

fn metric_from_tag(tag: u8) -> Result<DistanceMetric, IndexError> {
    match tag {
        0 => Ok(DistanceMetric::Cosine),
        1 => Ok(DistanceMetric::Euclidean),
        other => Err(IndexError::Snapshot(format!("unknown metric tag {other}"))),
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), IndexError> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> Result<String, IndexError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| IndexError::Snapshot(format!("invalid UTF-8: {e}")))
}

fn write_chunk<W: Write>(w: &mut W, chunk: &Chunk) -> Result<(), IndexError> {
    write_string(w, chunk.id.as_str())?;
    write_string(w, chunk.document.as_str())?;
    w.write_all(&chunk.ordinal.to_le_bytes())?;
    write_string(w, &chunk.text)?;
    for value in &chunk.embedding {
        w.write_all(&value.to_le_bytes())?;
    }
    w.write_all(&(chunk.metadata.len() as u32).to_le_bytes())?;
    for (key, value) in &chunk.metadata {
        write_string(w, key)?;
        write_string(w, value)?;
    }
    Ok(())
}

fn read_chunk<R: Read>(r: &mut R, dimension: usize) -> Result<Chunk, IndexError> {
    let id = read_string(r)?;
    let document = read_string(r)?;

    let mut ord_buf = [0u8; 4];
    r.read_exact(&mut ord_buf)?;
    let ordinal = u32::from_le_bytes(ord_buf);

    let text = read_string(r)?;

    let mut embedding = Vec::with_capacity(dimension);
    let mut f_buf = [0u8; 4];
    for _ in 0..dimension {
        r.read_exact(&mut f_buf)?;
        embedding.push(f32::from_le_bytes(f_buf));
    }

    let mut count_buf = [0u8; 4];
    r.read_exact(&mut count_buf)?;
    let pairs = u32::from_le_bytes(count_buf);
    let mut metadata = BTreeMap::new();
    for _ in 0..pairs {
        let key = read_string(r)?;
        let value = read_string(r)?;
        metadata.insert(key, value);
    }

    Ok(Chunk {
        id: ChunkId::new(id),
        document: DocumentId::new(document),
        ordinal,
        text,
        embedding,
        metadata,
    })
}

impl VectorIndex {
    /// Write a snapshot of all live chunks to `path`.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let chunks = self.live_chunks();

        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.dimension() as u32).to_le_bytes())?;
        w.write_all(&[metric_tag(self.metric())])?;
        w.write_all(&(chunks.len() as u64).to_le_bytes())?;

        for chunk in &chunks {
            write_chunk(&mut w, chunk)?;
        }
        w.flush()?;

        info!(path = %path.display(), chunks = chunks.len(), "index snapshot written");
        Ok(())
    }

    /// Rebuild an index from a snapshot.
    ///
    /// The snapshot's dimension and metric must agree with `params`;
    /// disagreement means the file belongs to a different index
    /// configuration and is rejected rather than silently adapted.
    pub fn load(path: &Path, params: IndexParams) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::Snapshot("bad magic, not an index snapshot".into()));
        }

        let mut version_buf = [0u8; 2];
        r.read_exact(&mut version_buf)?;
        let version = u16::from_le_bytes(version_buf);
        if version != VERSION {
            return Err(IndexError::Snapshot(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let mut dim_buf = [0u8; 4];
        r.read_exact(&mut dim_buf)?;
        let dimension = u32::from_le_bytes(dim_buf) as usize;
        if dimension != params.dimension {
            return Err(IndexError::Snapshot(format!(
                "snapshot dimension {dimension} does not match configured {}",
                params.dimension
            )));
        }

        let mut metric_buf = [0u8; 1];
        r.read_exact(&mut metric_buf)?;
        let metric = metric_from_tag(metric_buf[0])?;
        if metric != params.metric {
            return Err(IndexError::Snapshot(format!(
                "snapshot metric {metric:?} does not match configured {:?}",
                params.metric
            )));
        }

        let mut count_buf = [0u8; 8];
        r.read_exact(&mut count_buf)?;
        let count = u64::from_le_bytes(count_buf);

        let index = VectorIndex::new(params);
        for _ in 0..count {
            let chunk = read_chunk(&mut r, dimension)?;
            index.insert(chunk)?;
        }

        info!(path = %path.display(), chunks = index.len(), "index snapshot loaded");
        Ok(index)
    }
}
