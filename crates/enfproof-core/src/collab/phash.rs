//! Frame perceptual hash collaborator

use anyhow::{bail, Result};

/// Produces an opaque perceptual token for one reference frame.
pub trait FrameHasher: Send + Sync {
    fn perceptual_hash(&self, image_bytes: &[u8]) -> Result<String>;
}

const GRID_W: usize = 9;
const GRID_H: usize = 8;

/// Difference hash over an 8-bit grayscale raster (binary PGM).
///
/// The frame is area-averaged onto a 9x8 grid; each of the 64 bits records
/// whether a cell is brighter than its right neighbor. Visually similar
/// frames land on nearby tokens, which is all the ledger needs from this
/// boundary.
pub struct DifferenceFrameHasher;

impl FrameHasher for DifferenceFrameHasher {
    fn perceptual_hash(&self, image_bytes: &[u8]) -> Result<String> {
        let raster = parse_pgm(image_bytes)?;
        let grid = downscale(&raster);

        let mut bits: u64 = 0;
        let mut bit = 0;
        for row in 0..GRID_H {
            for col in 0..GRID_W - 1 {
                if grid[row * GRID_W + col] > grid[row * GRID_W + col + 1] {
                    bits |= 1 << bit;
                }
                bit += 1;
            }
        }

        Ok(format!("{:016x}", bits))
    }
}

struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

/// Parse a binary (P5) PGM with maxval <= 255.
fn parse_pgm(bytes: &[u8]) -> Result<Raster> {
    let mut cursor = 0usize;

    let magic = read_token(bytes, &mut cursor)?;
    if magic != b"P5" {
        bail!("not a binary PGM frame (bad magic)");
    }

    let width: usize = parse_number(&read_token(bytes, &mut cursor)?)?;
    let height: usize = parse_number(&read_token(bytes, &mut cursor)?)?;
    let maxval: usize = parse_number(&read_token(bytes, &mut cursor)?)?;

    if width == 0 || height == 0 {
        bail!("empty PGM frame ({width}x{height})");
    }
    if maxval == 0 || maxval > 255 {
        bail!("unsupported PGM maxval {maxval}");
    }

    // Single whitespace byte separates the header from the raster.
    cursor += 1;
    let expected = width * height;
    let raster = bytes
        .get(cursor..cursor + expected)
        .ok_or_else(|| anyhow::anyhow!("truncated PGM raster"))?;

    Ok(Raster {
        width,
        height,
        pixels: raster.to_vec(),
    })
}

/// Read one whitespace-delimited header token, skipping `#` comments.
fn read_token(bytes: &[u8], cursor: &mut usize) -> Result<Vec<u8>> {
    // Skip whitespace and comment lines.
    loop {
        while *cursor < bytes.len() && bytes[*cursor].is_ascii_whitespace() {
            *cursor += 1;
        }
        if *cursor < bytes.len() && bytes[*cursor] == b'#' {
            while *cursor < bytes.len() && bytes[*cursor] != b'\n' {
                *cursor += 1;
            }
        } else {
            break;
        }
    }

    let start = *cursor;
    while *cursor < bytes.len() && !bytes[*cursor].is_ascii_whitespace() {
        *cursor += 1;
    }
    if start == *cursor {
        bail!("truncated PGM header");
    }
    Ok(bytes[start..*cursor].to_vec())
}

fn parse_number(token: &[u8]) -> Result<usize> {
    std::str::from_utf8(token)?
        .parse()
        .map_err(|e| anyhow::anyhow!("bad PGM header field: {e}"))
}

/// Area-average the raster onto the hash grid.
fn downscale(raster: &Raster) -> Vec<f64> {
    let mut grid = vec![0.0f64; GRID_W * GRID_H];

    for gy in 0..GRID_H {
        for gx in 0..GRID_W {
            let x0 = gx * raster.width / GRID_W;
            let x1 = ((gx + 1) * raster.width / GRID_W).max(x0 + 1).min(raster.width);
            let y0 = gy * raster.height / GRID_H;
            let y1 = ((gy + 1) * raster.height / GRID_H).max(y0 + 1).min(raster.height);

            let mut sum = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += raster.pixels[y * raster.width + x] as u64;
                }
            }
            grid[gy * GRID_W + gx] = sum as f64 / ((x1 - x0) * (y1 - y0)) as f64;
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pgm(width: usize, height: usize, pixel: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut bytes = format!("P5\n{width} {height}\n255\n").into_bytes();
        for y in 0..height {
            for x in 0..width {
                bytes.push(pixel(x, y));
            }
        }
        bytes
    }

    #[test]
    fn test_hash_is_16_hex_chars() {
        let frame = pgm(64, 48, |x, _| (x * 4) as u8);
        let token = DifferenceFrameHasher.perceptual_hash(&frame).unwrap();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deterministic_and_content_sensitive() {
        let hasher = DifferenceFrameHasher;
        let ramp = pgm(64, 48, |x, _| (x * 4) as u8);
        let inverse = pgm(64, 48, |x, _| 255 - (x * 4) as u8);

        assert_eq!(
            hasher.perceptual_hash(&ramp).unwrap(),
            hasher.perceptual_hash(&ramp).unwrap()
        );
        assert_ne!(
            hasher.perceptual_hash(&ramp).unwrap(),
            hasher.perceptual_hash(&inverse).unwrap()
        );
    }

    #[test]
    fn test_similar_frames_land_close() {
        let hasher = DifferenceFrameHasher;
        let base = pgm(64, 48, |x, y| ((x * 3 + y) % 256) as u8);
        // Mild brightness shift must not flip gradient comparisons.
        let brighter = pgm(64, 48, |x, y| (((x * 3 + y) % 256) as u8).saturating_add(10));

        let a = u64::from_str_radix(&hasher.perceptual_hash(&base).unwrap(), 16).unwrap();
        let b = u64::from_str_radix(&hasher.perceptual_hash(&brighter).unwrap(), 16).unwrap();
        let distance = (a ^ b).count_ones();
        assert!(distance <= 8, "hamming distance {distance}");
    }

    #[test]
    fn test_rejects_non_pgm() {
        let err = DifferenceFrameHasher.perceptual_hash(b"\x89PNG\r\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_truncated_raster() {
        let mut frame = pgm(64, 48, |_, _| 128);
        frame.truncate(frame.len() - 100);
        assert!(DifferenceFrameHasher.perceptual_hash(&frame).is_err());
    }

    #[test]
    fn test_comments_in_header() {
        let mut bytes = b"P5\n# extracted frame\n8 8\n255\n".to_vec();
        bytes.extend(std::iter::repeat(200u8).take(64));
        assert!(DifferenceFrameHasher.perceptual_hash(&bytes).is_ok());
    }
}
