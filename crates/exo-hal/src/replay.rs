//! Recorded datasets for offline (replay) sessions.
//!
//! A dataset is identified by a *base* path; each side lives in
//! `<base>_LEFT.csv` / `<base>_RIGHT.csv` and the calibration record in
//! `<base>_CONFIG.csv`.  These are exactly the files a live session writes,
//! so any recorded session can be replayed.
//!
//! Loading rules:
//!
//! 1. If the requested base has a file for every selected side, use it.
//! 2. Otherwise warn and fall back to the bundled default base.
//! 3. If the default is missing too, fail with [`ExoError::DatasetMissing`].
//!
//! Per-side datasets of different lengths are rejected rather than truncated.
//! A missing or incomplete calibration record is not a load error: the
//! affected track simply has no standing angle, and the session fails during
//! calibration instead.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use exo_types::{ExoError, Frame, Side};
use tracing::{info, warn};

/// Base name of the dataset bundled with the application.
pub const DEFAULT_REPLAY_BASE: &str = "Default_Past_Data";

/// One side's recorded frames and its recorded standing angle.
#[derive(Debug, Clone)]
pub struct ReplayTrack {
    side: Side,
    frames: Vec<Frame>,
    standing_angle: Option<f64>,
}

impl ReplayTrack {
    /// Build a track directly from frames (used by tests and tools).
    pub fn new(side: Side, frames: Vec<Frame>, standing_angle: Option<f64>) -> Self {
        Self {
            side,
            frames,
            standing_angle,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Row at `index`, if recorded.
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Standing angle from the calibration record, if one was found.
    pub fn standing_angle(&self) -> Option<f64> {
        self.standing_angle
    }

    /// Recorded `loop_time` column.
    pub fn loop_times(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.loop_time).collect()
    }
}

/// All tracks of one replay dataset, keyed by side.
#[derive(Debug)]
pub struct ReplaySet {
    base: PathBuf,
    tracks: BTreeMap<Side, ReplayTrack>,
}

impl ReplaySet {
    /// Load the tracks for `sides`, honouring the fallback rules above.
    ///
    /// # Errors
    ///
    /// - [`ExoError::DatasetMissing`] – neither the requested nor the default
    ///   dataset exists.
    /// - [`ExoError::Dataset`] – a file is unreadable, empty, or the sides
    ///   have different lengths.
    pub fn load(
        requested: Option<&Path>,
        default_base: &Path,
        sides: &[Side],
    ) -> Result<ReplaySet, ExoError> {
        let base = resolve_base(requested, default_base, sides)?;
        info!(base = %base.display(), "loading replay dataset");

        let calibration = read_calibration(&with_suffix(&base, "_CONFIG.csv"))?;

        let mut tracks = BTreeMap::new();
        for &side in sides {
            let frames = read_frames(&dataset_path(&base, side))?;
            if frames.is_empty() {
                return Err(ExoError::Dataset(format!(
                    "{} contains no rows",
                    dataset_path(&base, side).display()
                )));
            }
            let standing_angle = calibration.as_ref().and_then(|c| c.get(&side).copied());
            tracks.insert(side, ReplayTrack::new(side, frames, standing_angle));
        }

        let set = ReplaySet { base, tracks };
        set.check_lengths()?;
        Ok(set)
    }

    /// Assemble a set from in-memory tracks.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Dataset`] if no track is given, a track is empty,
    /// or the tracks differ in length.
    pub fn from_tracks(tracks: Vec<ReplayTrack>) -> Result<ReplaySet, ExoError> {
        if tracks.is_empty() {
            return Err(ExoError::Dataset("no replay tracks".to_string()));
        }
        if let Some(empty) = tracks.iter().find(|t| t.is_empty()) {
            return Err(ExoError::Dataset(format!("{} track has no rows", empty.side())));
        }
        let set = ReplaySet {
            base: PathBuf::from("<memory>"),
            tracks: tracks.into_iter().map(|t| (t.side(), t)).collect(),
        };
        set.check_lengths()?;
        Ok(set)
    }

    fn check_lengths(&self) -> Result<(), ExoError> {
        let mut lens = self.tracks.values().map(|t| (t.side(), t.len()));
        if let Some((first_side, first_len)) = lens.next() {
            for (side, len) in lens {
                if len != first_len {
                    return Err(ExoError::Dataset(format!(
                        "per-side datasets differ in length: {first_side} has {first_len} rows, {side} has {len}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Base path the tracks were actually loaded from.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Number of rows per side.
    pub fn len(&self) -> usize {
        self.tracks.values().next().map_or(0, ReplayTrack::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference `loop_time` sequence (first side in iteration order).
    pub fn loop_times(&self) -> Vec<f64> {
        self.tracks
            .values()
            .next()
            .map(ReplayTrack::loop_times)
            .unwrap_or_default()
    }

    pub fn into_tracks(self) -> impl Iterator<Item = ReplayTrack> {
        self.tracks.into_values()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// File helpers
// ────────────────────────────────────────────────────────────────────────────

/// `<base>_LEFT.csv` / `<base>_RIGHT.csv`.
pub fn dataset_path(base: &Path, side: Side) -> PathBuf {
    with_suffix(base, &format!("_{}.csv", side.label()))
}

/// Append `suffix` to the final path component without treating dots in
/// the base name as an extension.
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn has_all_sides(base: &Path, sides: &[Side]) -> bool {
    sides.iter().all(|&s| dataset_path(base, s).is_file())
}

fn resolve_base(
    requested: Option<&Path>,
    default_base: &Path,
    sides: &[Side],
) -> Result<PathBuf, ExoError> {
    if let Some(base) = requested {
        if has_all_sides(base, sides) {
            return Ok(base.to_path_buf());
        }
        warn!(
            requested = %base.display(),
            default = %default_base.display(),
            "no replay files found for requested dataset; using default dataset"
        );
    }
    if has_all_sides(default_base, sides) {
        return Ok(default_base.to_path_buf());
    }
    Err(ExoError::DatasetMissing(format!(
        "neither {} nor the default dataset {} has files for {:?}",
        requested.map_or_else(|| "<none>".to_string(), |p| p.display().to_string()),
        default_base.display(),
        sides
    )))
}

fn read_frames(path: &Path) -> Result<Vec<Frame>, ExoError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| ExoError::Dataset(format!("cannot open {}: {e}", path.display())))?;
    let mut frames = Vec::new();
    for (row, record) in reader.deserialize::<Frame>().enumerate() {
        let frame = record.map_err(|e| {
            ExoError::Dataset(format!("{} row {}: {e}", path.display(), row + 1))
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Read `LEFT_STANDING_ANGLE` / `RIGHT_STANDING_ANGLE` from the first row of
/// a calibration record.  Returns `Ok(None)` when the file does not exist.
fn read_calibration(path: &Path) -> Result<Option<BTreeMap<Side, f64>>, ExoError> {
    if !path.is_file() {
        warn!(path = %path.display(), "replay calibration record not found");
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| ExoError::Dataset(format!("cannot open {}: {e}", path.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| ExoError::Dataset(format!("{}: {e}", path.display())))?
        .clone();
    let Some(first) = reader.records().next() else {
        warn!(path = %path.display(), "replay calibration record is empty");
        return Ok(None);
    };
    let first = first.map_err(|e| ExoError::Dataset(format!("{}: {e}", path.display())))?;

    let mut angles = BTreeMap::new();
    for side in Side::ALL {
        let column = format!("{}_STANDING_ANGLE", side.label());
        let value = headers
            .iter()
            .position(|h| h.trim() == column)
            .and_then(|i| first.get(i))
            .and_then(|v| v.trim().parse::<f64>().ok());
        match value {
            Some(v) => {
                angles.insert(side, v);
            }
            None => warn!(path = %path.display(), %column, "standing angle missing from calibration record"),
        }
    }
    Ok(Some(angles))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_side(base: &Path, side: Side, rows: usize) {
        let mut body = String::from("loop_time,ankle_angle,gyro_z\n");
        for i in 0..rows {
            body.push_str(&format!("{},{},{}\n", i as f64 * 0.01, i as f64, 0.0));
        }
        fs::write(dataset_path(base, side), body).unwrap();
    }

    fn write_calibration(base: &Path, left: f64, right: f64) {
        fs::write(
            with_suffix(base, "_CONFIG.csv"),
            format!("LOOP_TIME,LEFT_STANDING_ANGLE,RIGHT_STANDING_ANGLE\n0,{left},{right}\n"),
        )
        .unwrap();
    }

    #[test]
    fn loads_requested_dataset_with_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("walk.v2");
        write_side(&base, Side::Left, 10);
        write_side(&base, Side::Right, 10);
        write_calibration(&base, 2.5, -1.0);

        let set = ReplaySet::load(Some(&base), &dir.path().join("default"), &Side::ALL).unwrap();
        assert_eq!(set.len(), 10);
        assert_eq!(set.base(), base.as_path());
        let tracks: Vec<_> = set.into_tracks().collect();
        assert_eq!(tracks[0].side(), Side::Left);
        assert_eq!(tracks[0].standing_angle(), Some(2.5));
        assert_eq!(tracks[1].standing_angle(), Some(-1.0));
        assert_eq!(tracks[1].frame(3).unwrap().ankle_angle, 3.0);
    }

    #[test]
    fn falls_back_to_default_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join(DEFAULT_REPLAY_BASE);
        write_side(&default, Side::Left, 4);
        write_side(&default, Side::Right, 4);

        let missing = dir.path().join("does_not_exist");
        let set = ReplaySet::load(Some(&missing), &default, &Side::ALL).unwrap();
        assert_eq!(set.base(), default.as_path());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn missing_everything_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplaySet::load(
            Some(&dir.path().join("nope")),
            &dir.path().join("also_nope"),
            &Side::ALL,
        )
        .unwrap_err();
        assert!(matches!(err, ExoError::DatasetMissing(_)));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("uneven");
        write_side(&base, Side::Left, 10);
        write_side(&base, Side::Right, 9);
        let err = ReplaySet::load(Some(&base), &base, &Side::ALL).unwrap_err();
        assert!(matches!(err, ExoError::Dataset(msg) if msg.contains("differ in length")));
    }

    #[test]
    fn single_side_selection_ignores_other_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("left_only");
        write_side(&base, Side::Left, 5);
        let set = ReplaySet::load(Some(&base), &base, &[Side::Left]).unwrap();
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn missing_calibration_leaves_tracks_uncalibrated() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nocal");
        write_side(&base, Side::Left, 3);
        write_side(&base, Side::Right, 3);
        let set = ReplaySet::load(Some(&base), &base, &Side::ALL).unwrap();
        assert!(set.into_tracks().all(|t| t.standing_angle().is_none()));
    }

    #[test]
    fn loop_time_column_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("bad");
        fs::write(dataset_path(&base, Side::Left), "ankle_angle\n1.0\n").unwrap();
        let err = ReplaySet::load(Some(&base), &base, &[Side::Left]).unwrap_err();
        assert!(matches!(err, ExoError::Dataset(_)));
    }

    #[test]
    fn suffix_keeps_dotted_base_names() {
        let p = with_suffix(Path::new("/data/run.3"), "_LEFT.csv");
        assert_eq!(p, PathBuf::from("/data/run.3_LEFT.csv"));
    }

    #[test]
    fn from_tracks_rejects_empty_track() {
        let err = ReplaySet::from_tracks(vec![ReplayTrack::new(Side::Left, vec![], None)]).unwrap_err();
        assert!(matches!(err, ExoError::Dataset(_)));
    }
}
