// THEORY:
// The `coordinates` module reads and writes the coordinate table: the plain-text
// record of a trajectory with one row per processed frame.
//
//     frame,timestamp_ms,x,y
//     0,0,12,40
//     1,33,,
//
// Blank `x`/`y` cells mark a frame with no detection. Reading is strict: rows must
// arrive in strictly increasing frame and timestamp order, and every malformed cell
// is reported with its 1-based line number. Timestamps written with a fractional
// part (as older exports do) are rounded to the nearest millisecond on read.

use crate::core_modules::trajectory::{FrameObservation, Position, Trajectory};
use crate::error::{Result, TrailError};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub const HEADER: &str = "frame,timestamp_ms,x,y";

/// Writes `trajectory` as a coordinate table.
pub fn write_table<W: Write>(mut writer: W, trajectory: &Trajectory) -> Result<()> {
    writeln!(writer, "{HEADER}")?;
    for observation in trajectory {
        match observation.position {
            Some(Position { x, y }) => writeln!(
                writer,
                "{},{},{},{}",
                observation.frame_index, observation.timestamp_ms, x, y
            )?,
            None => writeln!(writer, "{},{},,", observation.frame_index, observation.timestamp_ms)?,
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads a coordinate table, validating order as it goes.
pub fn read_table<R: BufRead>(reader: R) -> Result<Trajectory> {
    let mut lines = reader.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(TrailError::format(1, "missing header")),
        }
    };
    let columns: Vec<&str> = header.trim().split(',').map(str::trim).collect();
    if columns != HEADER.split(',').collect::<Vec<_>>() {
        return Err(TrailError::format(1, format!("expected header `{HEADER}`, found `{}`", header.trim())));
    }

    let mut trajectory = Trajectory::new();
    for (index, line) in lines {
        let line_number = index + 1;
        let line = line?;
        let row = line.trim();
        if row.is_empty() {
            continue;
        }
        let observation = parse_row(row, line_number)?;
        trajectory
            .try_push(observation)
            .map_err(|order| TrailError::format(line_number, order.to_string()))?;
    }
    Ok(trajectory)
}

fn parse_row(row: &str, line: usize) -> Result<FrameObservation> {
    let cells: Vec<&str> = row.split(',').map(str::trim).collect();
    if cells.len() != 4 {
        return Err(TrailError::format(line, format!("expected 4 columns, found {}", cells.len())));
    }

    let frame_index = cells[0]
        .parse::<u64>()
        .map_err(|_| TrailError::format(line, format!("frame `{}` is not a non-negative integer", cells[0])))?;
    let timestamp_ms = parse_timestamp(cells[1])
        .ok_or_else(|| TrailError::format(line, format!("timestamp `{}` is not a non-negative number", cells[1])))?;

    let position = match (cells[2], cells[3]) {
        ("", "") => None,
        ("", _) | (_, "") => {
            return Err(TrailError::format(line, "x and y must both be present or both blank"));
        }
        (x, y) => {
            let parse = |cell: &str, axis: &str| {
                cell.parse::<i32>()
                    .map_err(|_| TrailError::format(line, format!("{axis} `{cell}` is not an integer")))
            };
            Some(Position {
                x: parse(x, "x")?,
                y: parse(y, "y")?,
            })
        }
    };

    Ok(FrameObservation {
        frame_index,
        timestamp_ms,
        position,
    })
}

fn parse_timestamp(cell: &str) -> Option<u64> {
    if let Ok(ms) = cell.parse::<u64>() {
        return Some(ms);
    }
    let ms = cell.parse::<f64>().ok()?;
    (ms.is_finite() && ms >= 0.0).then(|| ms.round() as u64)
}

/// Writes a coordinate table file.
pub fn write_csv(path: impl AsRef<Path>, trajectory: &Trajectory) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_table(BufWriter::new(file), trajectory)?;
    tracing::info!(path = %path.display(), rows = trajectory.len(), "wrote coordinate table");
    Ok(())
}

/// Reads a coordinate table file.
pub fn read_csv(path: impl AsRef<Path>) -> Result<Trajectory> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let trajectory = read_table(BufReader::new(file))?;
    tracing::info!(
        path = %path.display(),
        rows = trajectory.len(),
        detections = trajectory.detection_count(),
        "read coordinate table"
    );
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::trajectory::TrajectoryAccumulator;

    fn sample() -> Trajectory {
        let mut acc = TrajectoryAccumulator::new(30.0).unwrap();
        acc.record(Some(Position { x: 12, y: 40 }));
        acc.record(None);
        acc.record(Some(Position { x: -3, y: 7 }));
        acc.finish()
    }

    fn read_str(text: &str) -> Result<Trajectory> {
        read_table(text.as_bytes())
    }

    #[test]
    fn writes_blank_cells_for_gaps() {
        let mut out = Vec::new();
        write_table(&mut out, &sample()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "frame,timestamp_ms,x,y\n0,0,12,40\n1,33,,\n2,67,-3,7\n"
        );
    }

    #[test]
    fn table_round_trips() {
        let original = sample();
        let mut out = Vec::new();
        write_table(&mut out, &original).unwrap();
        assert_eq!(read_table(out.as_slice()).unwrap(), original);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coords.csv");
        write_csv(&path, &sample()).unwrap();
        assert_eq!(read_csv(&path).unwrap(), sample());
    }

    #[test]
    fn duplicate_frame_is_a_format_error_with_line() {
        let err = read_str("frame,timestamp_ms,x,y\n0,0,1,1\n0,10,2,2\n").unwrap_err();
        assert!(matches!(err, TrailError::Format { line: 3, .. }), "{err}");
    }

    #[test]
    fn out_of_order_frame_is_a_format_error() {
        let err = read_str("frame,timestamp_ms,x,y\n5,100,1,1\n4,120,2,2\n").unwrap_err();
        match err {
            TrailError::Format { line, reason } => {
                assert_eq!(line, 3);
                assert_eq!(reason, "frame index 4 does not follow 5");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn malformed_rows_are_rejected() {
        for bad in [
            "frame,timestamp_ms,x,y\n0,0,1\n",
            "frame,timestamp_ms,x,y\nzero,0,1,1\n",
            "frame,timestamp_ms,x,y\n0,0,1,\n",
            "frame,timestamp_ms,x,y\n0,-4,1,1\n",
            "frame,timestamp_ms,x,y\n0,0,1.5,2\n",
            "frame,x,y\n0,1,1\n",
            "",
        ] {
            assert!(matches!(read_str(bad), Err(TrailError::Format { .. })), "{bad:?}");
        }
    }

    #[test]
    fn fractional_timestamps_and_crlf_are_accepted() {
        let t = read_str("frame,timestamp_ms,x,y\r\n1,0.0,5,5\r\n2,16.7,6,6\r\n\r\n").unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1).unwrap().timestamp_ms, 17);
        assert_eq!(t.get(0).unwrap().frame_index, 1);
    }
}
