// Sprite partitioning
//
// Splits an ordered frame sequence into fixed-capacity grids. Every sprite but
// the last is full; the last holds the remainder and only as many rows as it needs.

use serde::{Deserialize, Serialize};

use crate::constants::{SPRITE_PREFIX, THUMB_FORMAT};
use crate::error::{PreviewError, Result};

/// A contiguous run of frames `[start_index, start_index + frames)` packed into one sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub index: u32,
    pub start_index: u32,
    pub frames: u32,
    pub columns: u32,
    pub rows_used: u32,
}

impl Partition {
    pub fn end_index(&self) -> u32 {
        self.start_index + self.frames
    }

    /// Grid cell (column, row) of the `k`-th frame in this partition.
    pub fn cell(&self, k: u32) -> (u32, u32) {
        (k % self.columns, k / self.columns)
    }

    /// Stable file name. Zero-padded so lexical order matches partition order.
    pub fn file_name(&self) -> String {
        sprite_file_name(self.index)
    }
}

pub fn sprite_file_name(index: u32) -> String {
    format!("{}{:03}.{}", SPRITE_PREFIX, index, THUMB_FORMAT)
}

/// Parse a partition index back out of a sprite file name.
pub fn parse_sprite_file_name(name: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(SPRITE_PREFIX)?
        .strip_suffix(THUMB_FORMAT)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Compute the partition plan for `total_frames` frames on a `columns` x `rows` grid.
pub fn plan(total_frames: u32, columns: u32, rows: u32) -> Result<Vec<Partition>> {
    if total_frames == 0 {
        return Err(PreviewError::InvalidInput(
            "no frames to partition".to_string(),
        ));
    }
    if columns == 0 || rows == 0 {
        return Err(PreviewError::InvalidInput(format!(
            "sprite grid must be at least 1x1, got {}x{}",
            columns, rows
        )));
    }

    let capacity = columns.checked_mul(rows).ok_or_else(|| {
        PreviewError::InvalidInput(format!("sprite grid {}x{} is too large", columns, rows))
    })?;
    let sprite_count = total_frames.div_ceil(capacity);

    let partitions = (0..sprite_count)
        .map(|index| {
            let start_index = index * capacity;
            let frames = capacity.min(total_frames - start_index);
            Partition {
                index,
                start_index,
                frames,
                columns,
                rows_used: frames.div_ceil(columns),
            }
        })
        .collect();

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(partitions: &[Partition], total: u32, columns: u32, rows: u32) {
        let capacity = columns * rows;
        let mut next = 0;
        for (i, p) in partitions.iter().enumerate() {
            assert_eq!(p.index as usize, i);
            assert_eq!(p.start_index, next, "gap or overlap at partition {}", i);
            assert_eq!(p.rows_used, p.frames.div_ceil(columns));
            assert!(p.rows_used <= rows);
            if i + 1 < partitions.len() {
                assert_eq!(p.frames, capacity);
            } else {
                assert!(p.frames >= 1 && p.frames <= capacity);
            }
            next = p.end_index();
        }
        assert_eq!(next, total);
        assert_eq!(partitions.iter().map(|p| p.frames).sum::<u32>(), total);
    }

    #[test]
    fn test_single_partial_sprite() {
        let parts = plan(23, 5, 5).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].start_index, 0);
        assert_eq!(parts[0].frames, 23);
        assert_eq!(parts[0].rows_used, 5);
    }

    #[test]
    fn test_three_sprites_with_short_tail() {
        let parts = plan(52, 5, 5).unwrap();
        let summary: Vec<_> = parts
            .iter()
            .map(|p| (p.start_index, p.frames, p.rows_used))
            .collect();
        assert_eq!(summary, vec![(0, 25, 5), (25, 25, 5), (50, 2, 1)]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let parts = plan(50, 5, 5).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].frames, 25);
    }

    #[test]
    fn test_zero_frames_rejected() {
        assert!(matches!(plan(0, 5, 5), Err(PreviewError::InvalidInput(_))));
    }

    #[test]
    fn test_zero_grid_rejected() {
        assert!(matches!(plan(10, 0, 5), Err(PreviewError::InvalidInput(_))));
        assert!(matches!(plan(10, 5, 0), Err(PreviewError::InvalidInput(_))));
    }

    #[test]
    fn test_coverage_across_shapes() {
        for total in 1..=120 {
            for (columns, rows) in [(1, 1), (1, 4), (4, 1), (3, 2), (5, 5), (7, 3)] {
                let parts = plan(total, columns, rows).unwrap();
                assert_covers(&parts, total, columns, rows);
            }
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan(977, 6, 4).unwrap(), plan(977, 6, 4).unwrap());
    }

    #[test]
    fn test_cell_is_row_major() {
        let p = plan(7, 3, 3).unwrap()[0];
        assert_eq!(p.cell(0), (0, 0));
        assert_eq!(p.cell(2), (2, 0));
        assert_eq!(p.cell(3), (0, 1));
        assert_eq!(p.cell(6), (0, 2));
    }

    #[test]
    fn test_sprite_file_names_sort_in_partition_order() {
        let mut names: Vec<String> = (0..12).map(sprite_file_name).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
        assert_eq!(sprite_file_name(7), "sprite-007.jpg");
    }

    #[test]
    fn test_parse_sprite_file_name() {
        assert_eq!(parse_sprite_file_name("sprite-007.jpg"), Some(7));
        assert_eq!(parse_sprite_file_name("sprite-1234.jpg"), Some(1234));
        assert_eq!(parse_sprite_file_name("sprite-.jpg"), None);
        assert_eq!(parse_sprite_file_name("sprite-00a.jpg"), None);
        assert_eq!(parse_sprite_file_name(".sprite-001.jpg"), None);
        assert_eq!(parse_sprite_file_name("thumb-000001.jpg"), None);
    }
}
