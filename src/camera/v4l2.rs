use crate::camera::FrameSource;
use crate::common::config::CameraConfig;
use crate::common::{FaceGateError, Result};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC, Format};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use std::fs;
use std::time::Duration;

/// Device index that asks for auto-detection of a grayscale/IR camera.
pub const AUTO_DETECT_INDEX: u32 = 999;

/// One `/dev/video*` entry as reported by [`Camera::list_all_cameras`].
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub features: Vec<String>,
    pub likely_ir: bool,
}

pub struct Camera {
    device: Device,
    config: CameraConfig,
}

/// Streaming session; owns the mmap stream for as long as the controller loop runs.
pub struct CameraSession<'a> {
    stream: Stream<'a>,
    format: Format,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let device_index = if config.device_index == AUTO_DETECT_INDEX {
            Self::detect_ir_camera()?
        } else {
            config.device_index
        };
        Self::new_with_device(device_index, config.clone())
    }

    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for index in video_device_indices()? {
            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let mut features = Vec::new();
            let mut likely_ir = false;

            if caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                features.push("VIDEO_CAPTURE".to_string());
            } else if caps.capabilities.contains(v4l::capability::Flags::META_CAPTURE) {
                features.push("METADATA_CAPTURE".to_string());
            }

            for fmt in device.enum_formats().unwrap_or_default() {
                let fourcc_str = fmt.fourcc.str().unwrap_or("UNKNOWN");
                if is_grayscale_fourcc(&fmt.fourcc) {
                    features.push(format!("Grayscale ({})", fourcc_str));
                    likely_ir = true;
                } else if fourcc_str == "MJPG" || fourcc_str == "YUYV" {
                    features.push(format!("Color ({})", fourcc_str));
                }
            }

            if caps.card.contains("IR") || caps.card.contains("Infrared") {
                likely_ir = true;
            }

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                features,
                likely_ir,
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Prefers a capture device advertising a grayscale format, then one whose
    /// name suggests IR, then falls back to device 0.
    pub fn detect_ir_camera() -> Result<u32> {
        let mut candidates = Vec::new();

        for index in video_device_indices()? {
            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }

            let has_grayscale = device
                .enum_formats()
                .unwrap_or_default()
                .iter()
                .any(|fmt| is_grayscale_fourcc(&fmt.fourcc));

            if has_grayscale {
                candidates.push((index, caps.card.clone(), 100));
            } else if caps.card.contains("IR") {
                candidates.push((index, caps.card.clone(), 50));
            }
        }

        candidates.sort_by(|a, b| b.2.cmp(&a.2));

        if let Some((index, name, _)) = candidates.first() {
            tracing::info!("Selected camera: /dev/video{} ({})", index, name);
            Ok(*index)
        } else {
            tracing::info!("No IR camera detected, falling back to /dev/video0");
            Ok(0)
        }
    }

    pub fn new_with_device(index: u32, config: CameraConfig) -> Result<Self> {
        tracing::info!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| FaceGateError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| FaceGateError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture: {:?}",
                index, caps.capabilities);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        if !is_grayscale_fourcc(&fmt.fourcc) {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device.format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::info!("Camera format: {}x{} {}",
            actual.width, actual.height, actual.fourcc.str().unwrap_or("????"));

        if actual.width != config.width || actual.height != config.height {
            tracing::warn!("Camera resolution {}x{} differs from requested {}x{}",
                actual.width, actual.height, config.width, config.height);
        }

        Ok(Self { device, config })
    }

    pub fn start_session(&mut self) -> Result<CameraSession<'_>> {
        let format = self.device.format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get format: {}", e)))?;

        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceGateError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| FaceGateError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
        }
        tracing::debug!("Camera ready after {} warmup frame(s)", self.config.warmup_frames);

        Ok(CameraSession { stream, format })
    }
}

impl FrameSource for CameraSession<'_> {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        let (buf, _meta) = self.stream.next()
            .map_err(|e| FaceGateError::Camera(format!("Failed to capture: {}", e)))?;
        decode_frame(buf, self.format.width, self.format.height, &self.format.fourcc)
    }
}

/// Every fourcc accepted by [`is_grayscale_fourcc`] must decode here.
fn decode_frame(buf: &[u8], width: u32, height: u32, fourcc: &FourCC) -> Result<DynamicImage> {
    let pixels = (width * height) as usize;

    match &fourcc.repr {
        b"GREY" | b"Y8  " => {
            let data = buf.get(..pixels)
                .ok_or_else(|| FaceGateError::Camera("Short 8-bit grayscale frame".into()))?;
            luma_image(width, height, data.to_vec())
        }
        b"Y16 " => {
            // Little-endian 16-bit samples; keep the high byte.
            let data: Vec<u8> = buf.chunks_exact(2).take(pixels).map(|px| px[1]).collect();
            if data.len() < pixels {
                return Err(FaceGateError::Camera("Short Y16 frame".into()));
            }
            luma_image(width, height, data)
        }
        b"YUYV" => {
            // Luma is every other byte.
            let data: Vec<u8> = buf.iter().step_by(2).take(pixels).copied().collect();
            if data.len() < pixels {
                return Err(FaceGateError::Camera("Short YUYV frame".into()));
            }
            luma_image(width, height, data)
        }
        b"MJPG" => Ok(image::load_from_memory_with_format(buf, ImageFormat::Jpeg)?),
        other => Err(FaceGateError::Camera(format!(
            "Unsupported pixel format {}", String::from_utf8_lossy(other)
        ))),
    }
}

fn luma_image(width: u32, height: u32, data: Vec<u8>) -> Result<DynamicImage> {
    let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data)
        .ok_or_else(|| FaceGateError::Camera("Failed to create grayscale image buffer".into()))?;
    Ok(DynamicImage::ImageLuma8(buffer))
}

fn is_grayscale_fourcc(fourcc: &FourCC) -> bool {
    matches!(&fourcc.repr, b"GREY" | b"Y8  " | b"Y16 ")
}

fn video_device_indices() -> Result<Vec<u32>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir("/dev")? {
        let path = entry?.path();
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("video"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(index) = index {
            indices.push(index);
        }
    }
    Ok(indices)
}
