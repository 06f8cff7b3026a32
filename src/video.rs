use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as ScalerContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{codec, decoder};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use crate::error::{Result, SketchError};
use crate::source::FrameSource;

// ============================================================================
// Camera / Video Frame Source
// ============================================================================

/// Decodes frames from a video file or capture device (e.g. `/dev/video0`)
/// and converts them to RGB.
pub struct VideoFrameSource {
    input_ctx: ffmpeg::format::context::Input,
    decoder: decoder::Video,
    scaler: ScalerContext,
    stream_idx: usize,
    eof_sent: bool,
    frame_count: u64,
}

impl VideoFrameSource {
    pub fn open(path: &str) -> Result<Self> {
        ffmpeg::init()?;

        // 1. Open Input
        let input_ctx =
            input(&path).map_err(|e| SketchError::CameraUnavailable(format!("{path}: {e}")))?;
        let video_stream = input_ctx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| SketchError::CameraUnavailable(format!("{path}: no video stream found")))?;
        let stream_idx = video_stream.index();

        // 2. Create Decoder
        let decoder_context = codec::context::Context::from_parameters(video_stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;

        log::info!(
            "Input found: {}x{} (Codec: {:?})",
            decoder.width(),
            decoder.height(),
            decoder.id()
        );

        // 3. Scaler to packed RGB for the canvas
        let scaler = ScalerContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )?;

        Ok(Self {
            input_ctx,
            decoder,
            scaler,
            stream_idx,
            eof_sent: false,
            frame_count: 0,
        })
    }

    fn receive(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = VideoFrame::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = VideoFrame::empty();
        self.scaler.run(&decoded, &mut rgb)?;

        self.frame_count += 1;
        if self.frame_count % 300 == 0 {
            log::debug!("Decoded {} frames", self.frame_count);
        }
        Ok(Some(frame_to_image(&rgb)))
    }
}

impl FrameSource for VideoFrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            if let Some(img) = self.receive()? {
                return Ok(Some(img));
            }
            if self.eof_sent {
                log::info!("Video input finished after {} frames", self.frame_count);
                return Ok(None);
            }

            // Feed the next packet of our stream, or flush at end of input
            let mut fed = false;
            while let Some((stream, packet)) = self.input_ctx.packets().next() {
                if stream.index() == self.stream_idx {
                    self.decoder.send_packet(&packet)?;
                    fed = true;
                    break;
                }
            }
            if !fed {
                self.decoder.send_eof()?;
                self.eof_sent = true;
            }
        }
    }
}

/// Copy an RGB24 frame row by row; rows may be padded beyond `width * 3`.
fn frame_to_image(frame: &VideoFrame) -> RgbImage {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = frame.data(0);

    let mut raw = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        raw.extend_from_slice(&data[start..start + row_bytes]);
    }
    // Buffer length matches width * height * 3 by construction
    RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height))
}
