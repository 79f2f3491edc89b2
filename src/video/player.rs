use rand::Rng;
use std::ffi::OsString;
use std::path::Path;

use crate::core::PlayerConfig;

/// The part of a video that gets played.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayWindow {
    pub offset_secs: u64,
    pub duration_secs: f64,
}

impl PlayWindow {
    pub fn whole(duration_secs: f64) -> Self {
        Self { offset_secs: 0, duration_secs }
    }

    /// Pick the window for a video of `video_secs`. A clip of 0 (or one at
    /// least as long as the video) plays the whole thing; otherwise the clip
    /// starts at a random whole second that keeps it inside the video.
    pub fn plan<R: Rng + ?Sized>(video_secs: f64, clip_secs: f64, rng: &mut R) -> Self {
        let clip_secs = if clip_secs.is_finite() && clip_secs > 0.0 { clip_secs } else { 0.0 };

        if clip_secs == 0.0 || clip_secs >= video_secs {
            return Self::whole(video_secs);
        }

        let latest_start = (video_secs - clip_secs).floor();
        if latest_start.is_nan() || latest_start < 0.0 {
            return Self::whole(video_secs);
        }

        Self {
            offset_secs: rng.gen_range(0..=latest_start as u64),
            duration_secs: clip_secs,
        }
    }
}

/// Format seconds as the `H:MM:SS` position the player expects. Hours do not
/// wrap at a day and fractions of a second are dropped.
pub fn format_timestamp(secs: f64) -> String {
    // TimeDelta holds at most i64::MAX milliseconds
    let whole = if secs.is_finite() && secs > 0.0 { (secs.trunc() as i64).min(i64::MAX / 1000) } else { 0 };
    let delta = chrono::TimeDelta::seconds(whole);

    format!(
        "{}:{:02}:{:02}",
        delta.num_hours(),
        delta.num_minutes() % 60,
        delta.num_seconds() % 60
    )
}

/// Arguments for one player run: base flags, optional mute flags, the seek
/// flag when starting past zero, then the file.
pub fn build_args(player: &PlayerConfig, window: &PlayWindow, mute: bool, file: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = player.base_args.iter().map(OsString::from).collect();

    if mute {
        args.extend(player.mute_args.iter().map(OsString::from));
    }

    if window.offset_secs > 0 {
        args.push(OsString::from(&player.seek_flag));
        args.push(OsString::from(format_timestamp(window.offset_secs as f64)));
    }

    args.push(file.as_os_str().to_os_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00:00");
        assert_eq!(format_timestamp(59.9), "0:00:59");
        assert_eq!(format_timestamp(3661.0), "1:01:01");
        assert_eq!(format_timestamp(90000.0), "25:00:00");
        assert_eq!(format_timestamp(360000.0), "100:00:00");
    }

    #[test]
    fn test_format_timestamp_clamps_nonsense() {
        assert_eq!(format_timestamp(-5.0), "0:00:00");
        assert_eq!(format_timestamp(f64::NAN), "0:00:00");
    }

    #[test]
    fn test_zero_clip_plays_whole_video() {
        let mut rng = StdRng::seed_from_u64(1);
        for duration in [0.5, 10.0, 93.44, 7200.0] {
            assert_eq!(PlayWindow::plan(duration, 0.0, &mut rng), PlayWindow::whole(duration));
        }
    }

    #[test]
    fn test_long_clip_plays_whole_video() {
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(PlayWindow::plan(30.0, 30.0, &mut rng), PlayWindow::whole(30.0));
        assert_eq!(PlayWindow::plan(30.0, 120.0, &mut rng), PlayWindow::whole(30.0));
        assert_eq!(PlayWindow::plan(30.0, -4.0, &mut rng), PlayWindow::whole(30.0));
    }

    #[test]
    fn test_clip_window_stays_inside_video() {
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..500 {
            let video = 11.0 + (i as f64) * 0.73;
            let clip = 1.0 + (i % 10) as f64;
            let window = PlayWindow::plan(video, clip, &mut rng);

            assert_eq!(window.duration_secs, clip);
            assert!(window.offset_secs as f64 + window.duration_secs <= video);
        }
    }

    #[test]
    fn test_clip_offset_range_for_100s_video() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen_nonzero = false;
        for _ in 0..200 {
            let window = PlayWindow::plan(100.0, 10.0, &mut rng);
            assert_eq!(window.duration_secs, 10.0);
            assert!(window.offset_secs <= 90);
            seen_nonzero |= window.offset_secs > 0;
        }
        assert!(seen_nonzero);
    }

    #[test]
    fn test_build_args_whole_video() {
        let player = PlayerConfig::default();
        let args = build_args(&player, &PlayWindow::whole(60.0), false, Path::new("/v/a.mp4"));
        assert_eq!(args, vec!["-b", "--no-osd", "/v/a.mp4"]);
    }

    #[test]
    fn test_build_args_muted_clip() {
        let player = PlayerConfig::default();
        let window = PlayWindow { offset_secs: 3725, duration_secs: 10.0 };
        let args = build_args(&player, &window, true, Path::new("/v/a.mp4"));
        assert_eq!(args, vec!["-b", "--no-osd", "-n", "-1", "--pos", "1:02:05", "/v/a.mp4"]);
    }

    #[test]
    fn test_build_args_clip_at_zero_has_no_seek() {
        let player = PlayerConfig::default();
        let window = PlayWindow { offset_secs: 0, duration_secs: 10.0 };
        let args = build_args(&player, &window, false, Path::new("/v/a.mp4"));
        assert!(!args.iter().any(|a| a == "--pos"));
        assert_eq!(args.last().unwrap(), "/v/a.mp4");
    }
}
