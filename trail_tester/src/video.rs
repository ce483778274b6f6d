// THEORY:
// The `video` module is the OpenCV seam of the tester. It adapts `VideoCapture` and
// `VideoWriter` to the `FrameSource` and `FrameSink` traits of the core library so the
// tracking engine itself never sees a `Mat`.
//
// OpenCV hands out BGR frames; the core works on `image::RgbImage`. Conversion happens
// here in both directions with `imgproc::cvt_color`.
//
// `PreviewWindow` is the live view of a tracking run: each processed frame is shown in a
// highgui window with the detection circled and the frame number printed in the corner.

use color_trail::pipeline::{FrameObservation, FrameSink, FrameSource, VideoInfo};
use color_trail::{BgrColor, Result, TrailError};
use image::RgbImage;
use opencv::{
    core::{self, Mat, Point, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::Path;

const PREVIEW_RADIUS: i32 = 10;
const PREVIEW_THICKNESS: i32 = 2;
const QUIT_KEY: i32 = 'q' as i32;
const ESCAPE_KEY: i32 = 27;

fn video_error(err: opencv::Error) -> TrailError {
    TrailError::Video(err.to_string())
}

fn scalar(color: BgrColor) -> Scalar {
    let [b, g, r] = color.0;
    Scalar::new(b as f64, g as f64, r as f64, 0.0)
}

/// Copies an RGB frame into a freshly allocated BGR `Mat`.
fn to_bgr_mat(frame: &RgbImage) -> Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )
    .map_err(video_error)?;
    rgb.data_bytes_mut().map_err(video_error)?.copy_from_slice(frame.as_raw());

    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(video_error)?;
    Ok(bgr)
}

/// Frames decoded from a video file.
pub struct VideoFileSource {
    capture: VideoCapture,
    info: VideoInfo,
    bgr: Mat,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let capture = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY).map_err(video_error)?;
        if !capture.is_opened().map_err(video_error)? {
            return Err(TrailError::Video(format!("cannot open video {}", path.display())));
        }
        let info = VideoInfo {
            width: capture.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(video_error)? as u32,
            height: capture.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(video_error)? as u32,
            fps: capture.get(videoio::CAP_PROP_FPS).map_err(video_error)?,
        };
        tracing::info!(path = %path.display(), width = info.width, height = info.height, fps = info.fps, "opened video");
        Ok(Self {
            capture,
            info,
            bgr: Mat::default(),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.capture.read(&mut self.bgr).map_err(video_error)? || self.bgr.empty() {
            return Ok(None);
        }
        let size = self.bgr.size().map_err(video_error)?;
        let mut rgb = Mat::default();
        imgproc::cvt_color(&self.bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(video_error)?;
        let bytes = rgb.data_bytes().map_err(video_error)?.to_vec();
        RgbImage::from_raw(size.width as u32, size.height as u32, bytes)
            .map(Some)
            .ok_or(TrailError::Internal("decoded frame buffer does not match its size"))
    }
}

/// Frames encoded into an `mp4v` video file.
pub struct VideoFileSink {
    writer: VideoWriter,
    width: u32,
    height: u32,
}

impl VideoFileSink {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(video_error)?;
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            core::Size::new(width as i32, height as i32),
            true,
        )
        .map_err(video_error)?;
        if !writer.is_opened().map_err(video_error)? {
            return Err(TrailError::Video(format!("cannot create video {}", path.display())));
        }
        Ok(Self { writer, width, height })
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(TrailError::Video(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let bgr = to_bgr_mat(frame)?;
        self.writer.write(&bgr).map_err(video_error)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release().map_err(video_error)
    }
}

/// A highgui window showing each tracked frame as it is processed.
pub struct PreviewWindow {
    name: String,
    highlight: Scalar,
}

impl PreviewWindow {
    pub fn open(name: &str, highlight: BgrColor) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE).map_err(video_error)?;
        Ok(Self {
            name: name.to_string(),
            highlight: scalar(highlight),
        })
    }

    /// Draws and shows one frame. Returns true once the user pressed `q` or Escape.
    pub fn show(&mut self, frame: &RgbImage, observation: &FrameObservation) -> Result<bool> {
        let mut bgr = to_bgr_mat(frame)?;
        if let Some(position) = observation.position {
            imgproc::circle(
                &mut bgr,
                Point::new(position.x, position.y),
                PREVIEW_RADIUS,
                self.highlight,
                PREVIEW_THICKNESS,
                imgproc::LINE_8,
                0,
            )
            .map_err(video_error)?;
        }
        imgproc::put_text(
            &mut bgr,
            &frame_label(observation.frame_index),
            Point::new(10, 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            self.highlight,
            PREVIEW_THICKNESS,
            imgproc::LINE_8,
            false,
        )
        .map_err(video_error)?;

        highgui::imshow(&self.name, &bgr).map_err(video_error)?;
        let key = highgui::wait_key(1).map_err(video_error)?;
        Ok(is_quit_key(key))
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_window(&self.name) {
            tracing::debug!(error = %err, "failed to close preview window");
        }
    }
}

fn frame_label(frame_index: u64) -> String {
    format!("Frame: {frame_index}")
}

/// `wait_key` reports -1 when no key was pressed; modifier bits sit above the low byte.
fn is_quit_key(key: i32) -> bool {
    key >= 0 && matches!(key & 0xFF, QUIT_KEY | ESCAPE_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q_and_escape_quit_the_preview() {
        assert!(is_quit_key('q' as i32));
        assert!(is_quit_key(27));
        assert!(is_quit_key(0x10_0000 | 'q' as i32));
        assert!(!is_quit_key(-1));
        assert!(!is_quit_key('Q' as i32));
        assert!(!is_quit_key(' ' as i32));
    }

    #[test]
    fn frame_label_counts_from_the_decoded_index() {
        assert_eq!(frame_label(0), "Frame: 0");
        assert_eq!(frame_label(42), "Frame: 42");
    }

    #[test]
    fn highlight_color_keeps_bgr_order() {
        let color = scalar(BgrColor([147, 20, 255]));
        assert_eq!(&color.0[..3], &[147.0, 20.0, 255.0]);
    }

    #[test]
    fn rgb_frames_become_bgr_mats() {
        let mut frame = RgbImage::new(3, 2);
        frame.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        let bgr = to_bgr_mat(&frame).unwrap();
        assert_eq!((bgr.rows(), bgr.cols()), (2, 3));
        let bytes = bgr.data_bytes().unwrap();
        assert_eq!(&bytes[(3 + 2) * 3..(3 + 2) * 3 + 3], &[30, 20, 10]);
    }
}
