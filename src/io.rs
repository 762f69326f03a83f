//! Safetensors I/O.
//!
//! Reader: [`StReader`] parses any safetensors file (8-byte LE header length,
//! JSON header, raw little-endian tensors) and hands tensors back as `f64` /
//! `i64` vectors or ndarray arrays.
//!
//! Writer: [`StWriter`] builds one, including the free-form `__metadata__`
//! string map.
//!
//! [`RawData`] is the continuous-recording file (`data` [C, T], `sfreq`,
//! optional newline-joined `ch_names` / `ch_types`).
use ndarray::{Array, Array1, Array2, Array3, Dimension, IxDyn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ErpError, Result};
use crate::signal::{Channel, ChannelKind, ContinuousSignal};

const METADATA_KEY: &str = "__metadata__";

fn format_err(msg: impl Into<String>) -> ErpError {
    ErpError::Checkpoint(msg.into())
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// A parsed safetensors file held in memory.
pub struct StReader {
    bytes: Vec<u8>,
    header: serde_json::Map<String, Value>,
    data_start: usize,
}

struct Entry<'a> {
    dtype: &'a str,
    shape: Vec<usize>,
    raw: &'a [u8],
}

impl StReader {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes).map_err(|e| format_err(format!("{}: {e}", path.display())))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let len_bytes: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| format_err("safetensors file too small"))?;
        let n = u64::from_le_bytes(len_bytes) as usize;
        let header_bytes = bytes
            .get(8..8 + n)
            .ok_or_else(|| format_err("truncated safetensors header"))?;
        let header: serde_json::Map<String, Value> = serde_json::from_slice(header_bytes)?;
        Ok(Self {
            header,
            data_start: 8 + n,
            bytes,
        })
    }

    /// Tensor names, excluding the metadata block.
    pub fn names(&self) -> Vec<&str> {
        self.header
            .keys()
            .filter(|k| k.as_str() != METADATA_KEY)
            .map(String::as_str)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        name != METADATA_KEY && self.header.contains_key(name)
    }

    /// The `__metadata__` string map (empty if absent).
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.header
            .get(METADATA_KEY)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// One metadata value, or an error naming the missing key.
    pub fn meta(&self, key: &str) -> Result<String> {
        self.metadata()
            .remove(key)
            .ok_or_else(|| format_err(format!("missing metadata '{key}'")))
    }

    fn entry(&self, name: &str) -> Result<Entry<'_>> {
        let e = self
            .header
            .get(name)
            .filter(|_| name != METADATA_KEY)
            .ok_or_else(|| format_err(format!("missing tensor '{name}'")))?;
        let dtype = e["dtype"]
            .as_str()
            .ok_or_else(|| format_err(format!("'{name}': no dtype")))?;
        let shape = e["shape"]
            .as_array()
            .ok_or_else(|| format_err(format!("'{name}': no shape")))?
            .iter()
            .map(|v| v.as_u64().map(|x| x as usize))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| format_err(format!("'{name}': bad shape")))?;
        let offsets = e["data_offsets"]
            .as_array()
            .and_then(|o| Some((o.first()?.as_u64()? as usize, o.get(1)?.as_u64()? as usize)))
            .ok_or_else(|| format_err(format!("'{name}': bad data_offsets")))?;
        let raw = self
            .bytes
            .get(self.data_start + offsets.0..self.data_start + offsets.1)
            .ok_or_else(|| format_err(format!("'{name}': data out of bounds")))?;
        Ok(Entry { dtype, shape, raw })
    }

    /// Any numeric tensor converted to `f64`.
    pub fn f64_tensor(&self, name: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let e = self.entry(name)?;
        let vals: Vec<f64> = match e.dtype {
            "F32" => e.raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
            "F64" => e.raw.chunks_exact(8).map(|b| f64::from_le_bytes(le8(b))).collect(),
            "I32" => e.raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
            "I64" => e.raw.chunks_exact(8).map(|b| i64::from_le_bytes(le8(b)) as f64).collect(),
            other => return Err(format_err(format!("'{name}': unsupported dtype {other}"))),
        };
        Ok((vals, e.shape))
    }

    /// An integer tensor as `i64`.
    pub fn i64_tensor(&self, name: &str) -> Result<(Vec<i64>, Vec<usize>)> {
        let e = self.entry(name)?;
        let vals: Vec<i64> = match e.dtype {
            "I32" => e.raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64).collect(),
            "I64" => e.raw.chunks_exact(8).map(|b| i64::from_le_bytes(le8(b))).collect(),
            other => return Err(format_err(format!("'{name}': expected integer dtype, got {other}"))),
        };
        Ok((vals, e.shape))
    }

    /// A `U8` tensor decoded as UTF-8.
    pub fn string(&self, name: &str) -> Result<String> {
        let e = self.entry(name)?;
        if e.dtype != "U8" {
            return Err(format_err(format!("'{name}': expected U8, got {}", e.dtype)));
        }
        String::from_utf8(e.raw.to_vec()).map_err(|_| format_err(format!("'{name}': invalid UTF-8")))
    }

    /// Newline-joined string list (empty entries skipped).
    pub fn string_list(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .string(name)?
            .split('\n')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn array<D: Dimension>(&self, name: &str) -> Result<Array<f64, D>> {
        let (vals, shape) = self.f64_tensor(name)?;
        Array::from_shape_vec(IxDyn(&shape), vals)
            .map_err(|e| format_err(format!("'{name}': {e}")))?
            .into_dimensionality::<D>()
            .map_err(|e| format_err(format!("'{name}': {e}")))
    }

    pub fn array1(&self, name: &str) -> Result<Array1<f64>> {
        self.array(name)
    }

    pub fn array2(&self, name: &str) -> Result<Array2<f64>> {
        self.array(name)
    }

    pub fn array3(&self, name: &str) -> Result<Array3<f64>> {
        self.array(name)
    }

    /// First element of a numeric tensor.
    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.f64_tensor(name)?
            .0
            .first()
            .copied()
            .ok_or_else(|| format_err(format!("'{name}': empty tensor")))
    }
}

fn le8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Safetensors file writer for F64, I64 and U8 (string) tensors.
///
/// ```rust,no_run
/// use erp::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("signal", &[1.0, 2.0, 3.0], &[1, 3]);
/// w.set_metadata("kind", "demo");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    /// Any-dimensional `f64` array, written in logical (row-major) order.
    pub fn add_array<D: Dimension>(&mut self, name: &str, arr: &Array<f64, D>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, arr.shape());
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn add_str(&mut self, name: &str, s: &str) {
        let bytes = s.as_bytes().to_vec();
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
    }

    /// Newline-joined list, read back with [`StReader::string_list`].
    pub fn add_str_list<S: AsRef<str>>(&mut self, name: &str, items: &[S]) {
        let joined = items.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("\n");
        self.add_str(name, &joined);
    }

    /// Serialise header and tensors.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    /// Write to `path`.
    ///
    /// The file is first written next to its destination and renamed into
    /// place, so an existing file is only ever replaced by a complete one.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let tmp = partial_path(path);
        std::fs::write(&tmp, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

// ── Raw recording ─────────────────────────────────────────────────────────────

/// Continuous recording loaded from a safetensors file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawData {
    /// [C, T] in original units.
    pub data: Array2<f64>,
    pub sfreq: f64,
    /// Channel names (generated as `CH{i}` if not saved).
    pub ch_names: Vec<String>,
    /// Channel roles; inferred from names when the file has none.
    pub ch_kinds: Vec<ChannelKind>,
}

impl RawData {
    pub fn load(path: &Path) -> Result<Self> {
        let st = StReader::open(path)?;
        let data = st.array2("data")?;
        let sfreq = st.scalar("sfreq")?;
        let n_ch = data.nrows();

        let ch_names = if st.contains("ch_names") {
            st.string_list("ch_names")?
        } else {
            log::warn!("{}: no channel names, numbering channels", path.display());
            (0..n_ch).map(|i| format!("CH{i}")).collect()
        };
        if ch_names.len() != n_ch {
            return Err(ErpError::ChannelMismatch(format!(
                "{}: {} channel names for {} data rows",
                path.display(),
                ch_names.len(),
                n_ch
            )));
        }

        let types = if st.contains("ch_types") {
            st.string_list("ch_types")?
        } else {
            Vec::new()
        };
        let ch_kinds = ch_names
            .iter()
            .enumerate()
            .map(|(i, name)| match types.get(i) {
                Some(t) => ChannelKind::parse(t).unwrap_or_else(|| {
                    let kind = ChannelKind::from_name(name);
                    log::warn!("Channel '{name}': unknown type '{t}', using {kind:?}");
                    kind
                }),
                None => ChannelKind::from_name(name),
            })
            .collect();

        log::info!(
            "Loaded {} ({} channels x {} samples @ {} Hz)",
            path.display(),
            n_ch,
            data.ncols(),
            sfreq
        );
        Ok(Self {
            data,
            sfreq,
            ch_names,
            ch_kinds,
        })
    }

    pub fn from_signal(signal: &ContinuousSignal) -> Self {
        Self {
            data: signal.data().to_owned(),
            sfreq: signal.sfreq(),
            ch_names: signal.ch_names(),
            ch_kinds: signal.channels().iter().map(|c| c.kind).collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_array("data", &self.data);
        w.add_f64("sfreq", &[self.sfreq], &[1]);
        w.add_str_list("ch_names", &self.ch_names);
        let types: Vec<String> = self
            .ch_kinds
            .iter()
            .map(|k| format!("{k:?}").to_ascii_lowercase())
            .collect();
        w.add_str_list("ch_types", &types);
        w.write(path)
    }

    pub fn into_signal(self) -> Result<ContinuousSignal> {
        let channels = self
            .ch_names
            .into_iter()
            .zip(self.ch_kinds)
            .map(|(name, kind)| Channel::new(name, kind))
            .collect();
        ContinuousSignal::new(self.data, self.sfreq, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn writer_output_parses() {
        let mut w = StWriter::new();
        w.set_metadata("subject", "sub-001");
        w.add_array("m", &array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        w.add_i64("codes", &[1, -3, 255], &[3]);
        w.add_str_list("names", &["Oz", "POz"]);
        let st = StReader::from_bytes(w.to_bytes().unwrap()).unwrap();

        assert_eq!(st.meta("subject").unwrap(), "sub-001");
        assert_eq!(st.array2("m").unwrap(), array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(st.i64_tensor("codes").unwrap().0, vec![1, -3, 255]);
        assert_eq!(st.string_list("names").unwrap(), vec!["Oz", "POz"]);
        assert!(!st.contains("__metadata__"));
        assert!(st.array3("m").is_err());
        assert!(st.meta("missing").is_err());
    }

    #[test]
    fn header_is_eight_byte_aligned() {
        let mut w = StWriter::new();
        w.add_f64("x", &[1.0], &[1]);
        let bytes = w.to_bytes().unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);
        assert_eq!(bytes.len(), 8 + n + 8);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(StReader::from_bytes(vec![1, 2, 3]).is_err());
        assert!(StReader::from_bytes(vec![255, 0, 0, 0, 0, 0, 0, 0, b'{']).is_err());
    }

    #[test]
    fn raw_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.safetensors");
        let channels = vec![
            Channel::eeg("Oz"),
            Channel::new("EXG1", ChannelKind::Eog),
            Channel::new("Status", ChannelKind::Stim),
        ];
        let sig = ContinuousSignal::new(Array2::from_shape_fn((3, 50), |(c, t)| (c * t) as f64), 256.0, channels)
            .unwrap();
        RawData::from_signal(&sig).save(&path).unwrap();
        assert!(!dir.path().join("raw.safetensors.partial").exists());

        let back = RawData::load(&path).unwrap().into_signal().unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn kinds_inferred_without_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.safetensors");
        let mut w = StWriter::new();
        w.add_array("data", &Array2::<f64>::zeros((2, 4)));
        w.add_f64("sfreq", &[512.0], &[1]);
        w.add_str_list("ch_names", &["Fp1", "Status"]);
        w.write(&path).unwrap();

        let raw = RawData::load(&path).unwrap();
        assert_eq!(raw.ch_kinds, vec![ChannelKind::Eeg, ChannelKind::Stim]);
        assert_eq!(raw.sfreq, 512.0);
    }
}
