//! Byte and text kernels: SHA-256, string sorting, run-length compression
//! and JSON element counting.

use super::{shard_ranges, timed, KernelContext, Measurement};
use crate::calibration::WorkloadParams;
use crate::error::KernelError;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

const HASH_CHUNK_BYTES: usize = 64 * 1024;

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill(buf.as_mut_slice());
    buf
}

// ===== SHA-256 =====

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

/// Digest each fixed-size chunk of `data[range]`; `range` is in chunks.
fn digest_chunks(data: &[u8], chunks: std::ops::Range<usize>) -> Vec<[u8; 32]> {
    chunks
        .map(|i| {
            let start = i * HASH_CHUNK_BYTES;
            let end = (start + HASH_CHUNK_BYTES).min(data.len());
            sha256(&data[start..end])
        })
        .collect()
}

pub(super) fn hash_computing(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let data = Arc::new(random_bytes(params.seed, params.hash_data_kb * 1024));
    let chunk_count = data.len().div_ceil(HASH_CHUNK_BYTES);

    let (digests, elapsed) = timed(|| -> Result<Vec<[u8; 32]>, KernelError> {
        if multi {
            let tasks: Vec<_> = shard_ranges(chunk_count, ctx.parallelism())
                .into_iter()
                .map(|chunks| {
                    let data = Arc::clone(&data);
                    move || digest_chunks(&data, chunks)
                })
                .collect();
            Ok(ctx.scatter(tasks)?.concat())
        } else {
            Ok(digest_chunks(&data, 0..chunk_count))
        }
    });
    let digests = digests?;

    if digests.len() != chunk_count {
        return Err(KernelError::Verification(format!(
            "{} digests for {} chunks",
            digests.len(),
            chunk_count
        )));
    }
    let first = sha256(&data[..HASH_CHUNK_BYTES.min(data.len())]);
    if digests.first() != Some(&first) {
        return Err(KernelError::Verification(
            "first chunk digest does not reproduce".to_string(),
        ));
    }

    let mut root = Sha256::new();
    for digest in &digests {
        root.update(digest);
    }
    let root: String = root.finalize().iter().map(|b| format!("{:02x}", b)).collect();

    Ok(Measurement {
        elapsed,
        operations: data.len() as f64,
        metrics: json!({ "bytes": data.len(), "chunks": chunk_count, "root_digest": root }),
    })
}

// ===== String sorting =====

fn random_strings(seed: u64, count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(8..=32);
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect()
        })
        .collect()
}

/// k-way merge of individually sorted runs.
fn merge_sorted(runs: Vec<Vec<String>>) -> Vec<String> {
    let total = runs.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = runs.into_iter().map(Vec::into_iter).collect();
    let mut heap = BinaryHeap::with_capacity(iters.len());
    for (run, it) in iters.iter_mut().enumerate() {
        if let Some(s) = it.next() {
            heap.push(Reverse((s, run)));
        }
    }

    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((s, run))) = heap.pop() {
        merged.push(s);
        if let Some(next) = iters[run].next() {
            heap.push(Reverse((next, run)));
        }
    }
    merged
}

pub(super) fn string_sorting(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let mut strings = random_strings(params.seed, params.string_count);
    let n = strings.len();

    let (sorted, elapsed) = if multi {
        let mut runs = Vec::new();
        for range in shard_ranges(n, ctx.parallelism()).into_iter().rev() {
            runs.push(strings.split_off(range.start));
        }
        timed(|| -> Result<Vec<String>, KernelError> {
            let tasks: Vec<_> = runs
                .into_iter()
                .map(|mut run| {
                    move || {
                        run.sort_unstable();
                        run
                    }
                })
                .collect();
            Ok(merge_sorted(ctx.scatter(tasks)?))
        })
    } else {
        timed(|| -> Result<Vec<String>, KernelError> {
            strings.sort_unstable();
            Ok(strings)
        })
    };
    let sorted = sorted?;

    if sorted.len() != n || sorted.windows(2).any(|w| w[0] > w[1]) {
        return Err(KernelError::Verification(
            "output is not a sorted permutation of the input".to_string(),
        ));
    }

    let nf = n as f64;
    Ok(Measurement {
        elapsed,
        operations: nf * nf.max(2.0).log2(),
        metrics: json!({ "string_count": n }),
    })
}

// ===== Run-length compression =====

/// Bytes arranged in runs of 1..=64 so RLE has something to find.
fn runny_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let byte: u8 = rng.gen_range(b'a'..=b'h');
        let run = rng.gen_range(1..=64).min(len - out.len());
        out.extend(std::iter::repeat(byte).take(run));
    }
    out
}

/// `(count, byte)` pairs, runs capped at 255.
fn rle_encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 4);
    let mut iter = input.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        let mut count: u8 = 1;
        while count < u8::MAX && iter.peek() == Some(&byte) {
            iter.next();
            count += 1;
        }
        out.push(count);
        out.push(byte);
    }
    out
}

fn rle_decode(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded.len() * 8);
    for pair in encoded.chunks_exact(2) {
        out.extend(std::iter::repeat(pair[1]).take(pair[0] as usize));
    }
    out
}

/// Encode then decode one slice; returns encoded size and whether it round-tripped.
fn rle_roundtrip(data: &[u8]) -> (usize, bool) {
    let encoded = rle_encode(data);
    let decoded = rle_decode(&encoded);
    (encoded.len(), decoded == data)
}

pub(super) fn compression(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let data = Arc::new(runny_bytes(params.seed, params.compression_data_kb * 1024));

    let (parts, elapsed) = timed(|| -> Result<Vec<(usize, bool)>, KernelError> {
        if multi {
            let tasks: Vec<_> = shard_ranges(data.len(), ctx.parallelism())
                .into_iter()
                .map(|range| {
                    let data = Arc::clone(&data);
                    move || rle_roundtrip(&data[range])
                })
                .collect();
            ctx.scatter(tasks)
        } else {
            Ok(vec![rle_roundtrip(&data)])
        }
    });
    let parts = parts?;

    if parts.iter().any(|&(_, ok)| !ok) {
        return Err(KernelError::Verification(
            "decompressed data differs from input".to_string(),
        ));
    }
    let encoded: usize = parts.iter().map(|&(len, _)| len).sum();

    Ok(Measurement {
        elapsed,
        // Every byte is compressed and then restored.
        operations: 2.0 * data.len() as f64,
        metrics: json!({
            "bytes": data.len(),
            "encoded_bytes": encoded,
            "ratio": data.len() as f64 / encoded.max(1) as f64,
        }),
    })
}

// ===== JSON parsing =====

/// A document of roughly `target_bytes`, plus the number of elements it holds.
fn generate_document(rng: &mut StdRng, target_bytes: usize) -> (String, u64) {
    let mut records = Vec::new();
    let mut approx = 2usize;
    let mut id = 0u64;
    while approx < target_bytes {
        let tags: Vec<Value> = (0..rng.gen_range(1..=4))
            .map(|t| Value::String(format!("tag{}", t)))
            .collect();
        let record = json!({
            "id": id,
            "score": rng.gen_range(0.0..1000.0),
            "active": rng.gen_bool(0.5),
            "name": format!("device-{:06}", rng.gen_range(0..1_000_000)),
            "tags": tags,
            "specs": { "cores": rng.gen_range(1..=16), "freq_mhz": rng.gen_range(800..=3600) },
        });
        approx += record.to_string().len() + 1;
        records.push(record);
        id += 1;
    }
    let doc = Value::Array(records);
    let elements = count_elements(&doc);
    (doc.to_string(), elements)
}

/// Every value in the tree, containers included.
fn count_elements(value: &Value) -> u64 {
    1 + match value {
        Value::Array(items) => items.iter().map(count_elements).sum(),
        Value::Object(map) => map.values().map(count_elements).sum(),
        _ => 0,
    }
}

fn parse_and_count(doc: &str) -> Result<u64, String> {
    serde_json::from_str::<Value>(doc)
        .map(|v| count_elements(&v))
        .map_err(|e| e.to_string())
}

pub(super) fn json_parsing(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let total_bytes = params.json_data_kb * 1024;
    let doc_count = if multi { ctx.parallelism() } else { 1 };
    let mut rng = StdRng::seed_from_u64(params.seed);
    let docs: Vec<(String, u64)> = (0..doc_count)
        .map(|_| generate_document(&mut rng, total_bytes / doc_count))
        .collect();
    let expected: u64 = docs.iter().map(|(_, e)| e).sum();
    let bytes: usize = docs.iter().map(|(d, _)| d.len()).sum();

    let (counts, elapsed) = timed(|| -> Result<Vec<Result<u64, String>>, KernelError> {
        if multi {
            let tasks: Vec<_> = docs
                .into_iter()
                .map(|(doc, _)| move || parse_and_count(&doc))
                .collect();
            ctx.scatter(tasks)
        } else {
            Ok(docs.iter().map(|(doc, _)| parse_and_count(doc)).collect())
        }
    });

    let mut counted = 0u64;
    for count in counts? {
        counted += count.map_err(KernelError::Failed)?;
    }
    if counted != expected {
        return Err(KernelError::Verification(format!(
            "counted {} elements, generated {}",
            counted, expected
        )));
    }

    Ok(Measurement {
        elapsed,
        operations: counted as f64,
        metrics: json!({ "bytes": bytes, "documents": doc_count, "elements": counted }),
    })
}
