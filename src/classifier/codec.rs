//! Checksummed model file reader and writer.
//!
//! A model file is a text header of `KEY=VALUE` lines closed by a `CKS` line
//! (CRC32 of the body, 8 hex digits) and a `HEADERLEN` line (byte length of
//! the whole header, 10 digits), followed by the body in ASCII or binary form.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::header::{CKS, HEADERLEN, ModelHeader};
use super::mlp::Network;
use super::{ShapeRecError, ShapeSample};
use crate::config::FileMode;
use crate::features::{FeatureExtractor, flatten, vector_from_text, vector_to_text};

/// `CKS=` + 8 hex digits + newline.
const CKS_LINE_LEN: usize = CKS.len() + 1 + 8 + 1;
/// `HEADERLEN=` + 10 digits + newline.
const HEADERLEN_LINE_LEN: usize = HEADERLEN.len() + 1 + 10 + 1;

/// CRC32 (IEEE polynomial, reflected) of the model body.
pub fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

/// Serialize `header` and `body`, replacing `path` atomically.
pub fn write_model(path: &Path, header: &ModelHeader, body: &[u8]) -> Result<(), ShapeRecError> {
    let mut text = String::new();
    for (key, value) in header.iter().filter(|(k, _)| *k != CKS && *k != HEADERLEN) {
        text.push_str(key);
        text.push('=');
        text.push_str(value);
        text.push('\n');
    }
    let checksum = crc32(body);
    let header_len = text.len() + CKS_LINE_LEN + HEADERLEN_LINE_LEN;
    text.push_str(&format!("{CKS}={checksum:08x}\n{HEADERLEN}={header_len:010}\n"));

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| ShapeRecError::io(dir, source))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|source| ShapeRecError::io(dir, source))?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.write_all(body))
        .and_then(|()| file.as_file().sync_all())
        .map_err(|source| ShapeRecError::io(path, source))?;
    file.persist(path)
        .map_err(|err| ShapeRecError::io(path, err.error))?;
    tracing::debug!("Wrote model file {} ({} body bytes)", path.display(), body.len());
    Ok(())
}

/// Read a model file, verifying header length and body checksum.
pub fn read_model(path: &Path) -> Result<(ModelHeader, Vec<u8>), ShapeRecError> {
    let data = std::fs::read(path).map_err(|source| ShapeRecError::io(path, source))?;
    let mut header = ModelHeader::new();
    let mut offset = 0usize;
    let mut declared_len = None;
    while offset < data.len() {
        let end = data[offset..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|pos| offset + pos)
            .ok_or_else(|| ShapeRecError::format(path, "header is not terminated"))?;
        let line = std::str::from_utf8(&data[offset..end])
            .map_err(|_| ShapeRecError::format(path, "header is not valid UTF-8"))?;
        offset = end + 1;
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ShapeRecError::format(path, format!("bad header line {line:?}")))?;
        if key == HEADERLEN {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ShapeRecError::format(path, format!("bad header length {value:?}")))?;
            declared_len = Some(len);
            break;
        }
        header.set(key.trim(), value.trim());
    }
    let Some(declared_len) = declared_len else {
        return Err(ShapeRecError::format(path, "missing HEADERLEN"));
    };
    if declared_len != offset {
        return Err(ShapeRecError::format(
            path,
            format!("header length is {offset} bytes but {declared_len} were declared"),
        ));
    }
    let body = data[offset..].to_vec();
    let stored = header
        .get(CKS)
        .and_then(|value| u32::from_str_radix(value, 16).ok())
        .ok_or_else(|| ShapeRecError::format(path, "missing or unreadable CKS"))?;
    let computed = crc32(&body);
    if stored != computed {
        return Err(ShapeRecError::format(
            path,
            format!("checksum mismatch: stored {stored:08x}, computed {computed:08x}"),
        ));
    }
    if let Some(key) = header.missing_mandatory() {
        return Err(ShapeRecError::format(path, format!("missing header field {key}")));
    }
    Ok((header, body))
}

/// Encode a prototype set preceded by its class count.
pub fn encode_prototypes(
    prototypes: &[ShapeSample],
    num_classes: usize,
    mode: FileMode,
) -> Result<Vec<u8>, ShapeRecError> {
    match mode {
        FileMode::Ascii => {
            let mut text = format!("{num_classes}\n");
            for sample in prototypes {
                text.push_str(&format!(
                    "{} {}\n",
                    sample.class_id,
                    vector_to_text(&sample.features)
                ));
            }
            Ok(text.into_bytes())
        }
        FileMode::Binary => {
            let mut out = Vec::new();
            push_class_count(&mut out, num_classes)?;
            for sample in prototypes {
                let dimension = sample.features.first().map_or(0, |f| f.dimension());
                out.extend_from_slice(&sample.class_id.to_le_bytes());
                out.extend_from_slice(&(sample.features.len() as u32).to_le_bytes());
                out.extend_from_slice(&(dimension as u32).to_le_bytes());
                for value in flatten(&sample.features) {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            Ok(out)
        }
    }
}

/// Decode a prototype body into `(declared class count, prototypes)`.
pub fn decode_prototypes(
    body: &[u8],
    mode: FileMode,
    extractor: &dyn FeatureExtractor,
    path: &Path,
) -> Result<(usize, Vec<ShapeSample>), ShapeRecError> {
    match mode {
        FileMode::Ascii => {
            let text = std::str::from_utf8(body)
                .map_err(|_| ShapeRecError::format(path, "body is not valid UTF-8"))?;
            let mut lines = text.lines().enumerate();
            let num_classes = parse_count_line(lines.next().map(|(_, line)| line), path)?;
            let mut prototypes = Vec::new();
            for (idx, line) in lines {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (id, features) = line.split_once(' ').ok_or_else(|| {
                    ShapeRecError::format(path, format!("line {}: no features", idx + 1))
                })?;
                let class_id = parse_class_id(id)?;
                let features = vector_from_text(features, extractor).map_err(|err| {
                    ShapeRecError::format(path, format!("line {}: {err}", idx + 1))
                })?;
                prototypes.push(ShapeSample::new(class_id, features));
            }
            Ok((num_classes, prototypes))
        }
        FileMode::Binary => {
            let mut reader = ByteReader::new(body, path);
            let num_classes = usize::from(reader.u16()?);
            let mut prototypes = Vec::new();
            while !reader.is_exhausted() {
                let class_id = reader.u32()?;
                let count = reader.u32()? as usize;
                let dimension = reader.u32()? as usize;
                let mut features = Vec::with_capacity(count);
                for _ in 0..count {
                    let values = (0..dimension)
                        .map(|_| reader.f32())
                        .collect::<Result<Vec<_>, _>>()?;
                    features.push(extractor.new_feature(&values)?);
                }
                prototypes.push(ShapeSample::new(class_id, features));
            }
            Ok((num_classes, prototypes))
        }
    }
}

/// Encode the class ids scored by the output units, then layer sizes,
/// weights and previous deltas.
pub fn encode_network(
    network: &Network,
    class_ids: &[u32],
    mode: FileMode,
) -> Result<Vec<u8>, ShapeRecError> {
    match mode {
        FileMode::Ascii => {
            let join = |values: &[f64]| {
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            let mut text = format!("{}\n", class_ids.len());
            let ids: Vec<String> = class_ids.iter().map(u32::to_string).collect();
            text.push_str(&ids.join(" "));
            text.push('\n');
            let sizes: Vec<String> = network.layers().iter().map(|n| n.to_string()).collect();
            text.push_str(&sizes.join(" "));
            text.push('\n');
            for block in network.weights().iter().chain(network.deltas()) {
                text.push_str(&join(block));
                text.push('\n');
            }
            Ok(text.into_bytes())
        }
        FileMode::Binary => {
            let mut out = Vec::new();
            push_class_count(&mut out, class_ids.len())?;
            for id in class_ids {
                out.extend_from_slice(&id.to_le_bytes());
            }
            out.extend_from_slice(&(network.layers().len() as u32).to_le_bytes());
            for units in network.layers() {
                out.extend_from_slice(&(*units as u32).to_le_bytes());
            }
            for block in network.weights().iter().chain(network.deltas()) {
                out.extend_from_slice(&(block.len() as u32).to_le_bytes());
                for value in block {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            Ok(out)
        }
    }
}

/// Decode a network body into `(class id per output unit, network)`.
///
/// Class ids must be strictly ascending and match the output layer size.
pub fn decode_network(
    body: &[u8],
    mode: FileMode,
    path: &Path,
) -> Result<(Vec<u32>, Network), ShapeRecError> {
    let (num_classes, class_ids, layers, mut blocks) = match mode {
        FileMode::Ascii => {
            let text = std::str::from_utf8(body)
                .map_err(|_| ShapeRecError::format(path, "body is not valid UTF-8"))?;
            let mut lines = text.lines();
            let num_classes = parse_count_line(lines.next(), path)?;
            let class_ids = lines
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .map(|token| token.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ShapeRecError::format(path, "bad class id list"))?;
            let layers = lines
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .map(|token| token.parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ShapeRecError::format(path, "bad layer sizes"))?;
            let blocks = lines
                .map(|line| {
                    line.split_whitespace()
                        .map(|token| token.parse::<f64>())
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| ShapeRecError::format(path, "bad weight value"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            (num_classes, class_ids, layers, blocks)
        }
        FileMode::Binary => {
            let mut reader = ByteReader::new(body, path);
            let num_classes = usize::from(reader.u16()?);
            let class_ids = (0..num_classes)
                .map(|_| reader.u32())
                .collect::<Result<Vec<_>, _>>()?;
            let layer_count = reader.u32()? as usize;
            let layers = (0..layer_count)
                .map(|_| reader.u32().map(|v| v as usize))
                .collect::<Result<Vec<_>, _>>()?;
            let mut blocks = Vec::new();
            while !reader.is_exhausted() {
                let len = reader.u32()? as usize;
                blocks.push((0..len).map(|_| reader.f64()).collect::<Result<Vec<_>, _>>()?);
            }
            (num_classes, class_ids, layers, blocks)
        }
    };
    if class_ids.len() != num_classes || class_ids.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ShapeRecError::format(
            path,
            format!("expected {num_classes} ascending class ids, found {class_ids:?}"),
        ));
    }
    let connections = layers.len().saturating_sub(1);
    if blocks.len() != connections * 2 {
        return Err(ShapeRecError::format(
            path,
            format!(
                "expected {} weight blocks, found {}",
                connections * 2,
                blocks.len()
            ),
        ));
    }
    let deltas = blocks.split_off(connections);
    let network = Network::from_parts(layers, blocks, deltas)
        .map_err(|err| ShapeRecError::format(path, err.to_string()))?;
    if network.output_units() != class_ids.len() {
        return Err(ShapeRecError::format(
            path,
            format!(
                "{} output units but {} class ids",
                network.output_units(),
                class_ids.len()
            ),
        ));
    }
    Ok((class_ids, network))
}

fn push_class_count(out: &mut Vec<u8>, num_classes: usize) -> Result<(), ShapeRecError> {
    let count = u16::try_from(num_classes).map_err(|_| {
        ShapeRecError::InvalidArgument(format!(
            "{num_classes} classes do not fit the binary model format"
        ))
    })?;
    out.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

fn parse_count_line(line: Option<&str>, path: &Path) -> Result<usize, ShapeRecError> {
    line.and_then(|line| line.trim().parse::<usize>().ok())
        .ok_or_else(|| ShapeRecError::format(path, "missing shape count"))
}

/// Parse a textual class id, rejecting negative values.
pub(crate) fn parse_class_id(token: &str) -> Result<u32, ShapeRecError> {
    let id = token
        .trim()
        .parse::<i64>()
        .map_err(|_| ShapeRecError::InputFormat(format!("bad class id {token:?}")))?;
    u32::try_from(id).map_err(|_| ShapeRecError::ShapeId {
        id,
        reason: "class ids must be non-negative",
    })
}

/// Little-endian cursor over a binary body.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self { data, pos: 0, path }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ShapeRecError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| ShapeRecError::format(self.path, "truncated body"))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, ShapeRecError> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, ShapeRecError> {
        self.take().map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, ShapeRecError> {
        self.take().map(f32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, ShapeRecError> {
        self.take().map(f64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::header::{ALGO_NAME, ALGO_VER, FE_NAME, FE_VER, MDT_OPEN_MODE, PREPROC_SEQ, TRACE_DIM};
    use crate::features::{PointFloatExtractor, PointFloatFeature, SharedFeature};
    use std::rc::Rc;

    fn header() -> ModelHeader {
        let mut header = ModelHeader::new();
        for (key, value) in [
            (FE_NAME, "PointFloatShapeFeatureExtractor"),
            (FE_VER, "1.0.0"),
            (PREPROC_SEQ, "{normalizeSize}"),
            (TRACE_DIM, "2"),
            (MDT_OPEN_MODE, "ascii"),
            (ALGO_NAME, "nn"),
            (ALGO_VER, "1.0.0"),
        ] {
            header.set(key, value);
        }
        header
    }

    fn prototypes() -> Vec<ShapeSample> {
        [(0u32, 0.25f32), (0, 0.5), (3, 1.5)]
            .iter()
            .map(|&(class_id, x)| {
                ShapeSample::new(
                    class_id,
                    vec![
                        Rc::new(PointFloatFeature::new(x, 0.0, 0.0, 1.0, false)) as SharedFeature,
                        Rc::new(PointFloatFeature::new(x, 1.0, 1.0, 0.0, true)) as SharedFeature,
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn crc32_matches_the_ieee_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn header_and_body_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nn.mdt");
        for mode in [FileMode::Ascii, FileMode::Binary] {
            let body = encode_prototypes(&prototypes(), 2, mode).unwrap();
            write_model(&path, &header(), &body).unwrap();
            let (read_header, read_body) = read_model(&path).unwrap();
            assert_eq!(read_header.get(TRACE_DIM), Some("2"));
            let (count, decoded) =
                decode_prototypes(&read_body, mode, &PointFloatExtractor::default(), &path).unwrap();
            assert_eq!(count, 2);
            assert_eq!(decoded.len(), 3);
            assert_eq!(decoded[2].class_id, 3);
            assert_eq!(flatten(&decoded[1].features), flatten(&prototypes()[1].features));
        }
    }

    #[test]
    fn corrupted_body_fails_the_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nn.mdt");
        let body = encode_prototypes(&prototypes(), 2, FileMode::Ascii).unwrap();
        write_model(&path, &header(), &body).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] = b'9';
        std::fs::write(&path, bytes).unwrap();
        let err = read_model(&path).unwrap_err();
        assert!(matches!(err, ShapeRecError::ModelFormat { .. }));
    }

    #[test]
    fn truncated_binary_body_is_a_format_error() {
        let body = encode_prototypes(&prototypes(), 2, FileMode::Binary).unwrap();
        let err = decode_prototypes(
            &body[..body.len() - 3],
            FileMode::Binary,
            &PointFloatExtractor::default(),
            Path::new("x"),
        )
        .unwrap_err();
        assert!(matches!(err, ShapeRecError::ModelFormat { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_model(&dir.path().join("absent.mdt")).unwrap_err();
        assert!(matches!(err, ShapeRecError::ModelIo { .. }));
    }

    #[test]
    fn negative_class_ids_are_rejected() {
        assert!(matches!(
            parse_class_id("-4"),
            Err(ShapeRecError::ShapeId { id: -4, .. })
        ));
        assert_eq!(parse_class_id("12").unwrap(), 12);
    }

    #[test]
    fn network_round_trips_in_both_modes() {
        let network = Network::from_parts(
            vec![2, 2, 1],
            vec![vec![0.1, -0.2, 0.3, 0.4, 0.5, -0.6], vec![0.7, 0.8, -0.9]],
            vec![vec![0.0; 6], vec![0.01, 0.0, -0.01]],
        )
        .unwrap();
        for mode in [FileMode::Ascii, FileMode::Binary] {
            let body = encode_network(&network, &[7], mode).unwrap();
            let (class_ids, decoded) = decode_network(&body, mode, Path::new("x")).unwrap();
            assert_eq!(class_ids, vec![7]);
            assert_eq!(decoded, network);
        }
    }

    #[test]
    fn network_class_ids_must_cover_the_output_layer() {
        let network = Network::from_parts(
            vec![1, 2],
            vec![vec![0.1, 0.2, 0.3, 0.4]],
            vec![vec![0.0; 4]],
        )
        .unwrap();
        for mode in [FileMode::Ascii, FileMode::Binary] {
            let body = encode_network(&network, &[3], mode).unwrap();
            let err = decode_network(&body, mode, Path::new("x")).unwrap_err();
            assert!(matches!(err, ShapeRecError::ModelFormat { .. }));
        }
        let body = encode_network(&network, &[5, 2], FileMode::Ascii).unwrap();
        assert!(decode_network(&body, FileMode::Ascii, Path::new("x")).is_err());
    }
}
