// src/video_processor.rs
//
// OpenCV-backed frame source and annotated-video sink.

use crate::pipeline::{FrameSink, FrameSource};
use crate::types::FrameSize;
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// `input` itself when it is a file, otherwise every video below it, sorted.
pub fn find_video_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Input path does not exist: {}", input.display());
    }

    let mut videos: Vec<PathBuf> = WalkDir::new(input)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    videos.sort();

    info!("Found {} video files", videos.len());
    Ok(videos)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

pub struct VideoReader {
    cap: VideoCapture,
    fps: f64,
    size: FrameSize,
    total_frames: Option<u64>,
    frames_read: u64,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let cap = VideoCapture::from_file(path_str(path)?, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)?;

        let size = FrameSize::new(width.max(0.0) as u32, height.max(0.0) as u32);
        let total_frames = (total > 0.0).then_some(total as u64);

        info!(
            "Video properties: {} @ {:.1} FPS, {} frames",
            size,
            fps,
            total_frames.map_or("unknown".to_string(), |t| t.to_string())
        );

        Ok(Self {
            cap,
            fps,
            size,
            total_frames,
            frames_read: 0,
        })
    }
}

impl FrameSource for VideoReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }
        self.frames_read += 1;

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let (cols, rows) = (rgb_mat.cols() as u32, rgb_mat.rows() as u32);
        let data = rgb_mat.data_bytes()?.to_vec();
        let frame = RgbImage::from_raw(cols, rows, data)
            .with_context(|| format!("Frame {} has an unexpected layout", self.frames_read))?;
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }
}

pub struct AnnotatedWriter {
    writer: VideoWriter,
    path: PathBuf,
    frames_written: u64,
}

impl AnnotatedWriter {
    pub fn create(path: &Path, size: FrameSize, fps: f64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Output video: {}", path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            fps,
            core::Size::new(size.width as i32, size.height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            anyhow::bail!("Failed to open video writer for {}", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for AnnotatedWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let flat = Mat::from_slice(frame.as_raw())?;
        let rgb = flat.reshape(3, frame.height() as i32)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&*rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;

        self.writer.write(&bgr)?;
        self.frames_written += 1;
        Ok(())
    }
}
