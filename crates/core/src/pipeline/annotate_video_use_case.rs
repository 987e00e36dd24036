use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::error::PipelineError;
use crate::shared::video_metadata::FrameRate;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::pipeline_logger::{stage, NullPipelineLogger, PipelineLogger};
use super::skip_frame_analyzer::SkipFrameAnalyzer;
use super::video_reassembler::VideoReassembler;

type ProgressCallback = Box<dyn Fn(usize, usize) -> bool + Send>;

/// Annotated container bytes plus what was learned from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedVideo {
    pub bytes: Vec<u8>,
    pub frame_rate: FrameRate,
    pub frames: usize,
}

/// Whole-video pipeline: stage the upload in a private temp directory,
/// decode frames in order, analyze on the skip/cache cadence, annotate
/// every frame and re-encode at the source rate.
///
/// Single-use: `execute` consumes the reader, writer and analyzer, so a
/// second call fails with [`PipelineError::AlreadyExecuted`].
pub struct AnnotateVideoUseCase {
    reader: Option<Box<dyn VideoReader>>,
    writer: Option<Box<dyn VideoWriter>>,
    analyzer: Option<SkipFrameAnalyzer>,
    annotator: Arc<dyn FrameAnnotator>,
    container: String,
    logger: Box<dyn PipelineLogger>,
    on_progress: Option<ProgressCallback>,
    cancelled: Arc<AtomicBool>,
}

impl AnnotateVideoUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        analyzer: SkipFrameAnalyzer,
        annotator: Arc<dyn FrameAnnotator>,
        container: &str,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            analyzer: Some(analyzer),
            annotator,
            container: sanitize_extension(container).unwrap_or("mp4").to_string(),
            logger: Box::new(NullPipelineLogger),
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Called after each frame with `(done, total)`; returning `false` stops
    /// processing. `total` is the container's estimate and may be 0.
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// `input_extension` hints the container format of `input`, e.g. "mp4".
    pub fn execute(
        &mut self,
        input: &[u8],
        input_extension: &str,
    ) -> Result<AnnotatedVideo, PipelineError> {
        let mut reader = self.reader.take().ok_or(PipelineError::AlreadyExecuted)?;
        let writer = self.writer.take().ok_or(PipelineError::AlreadyExecuted)?;
        let mut analyzer = self.analyzer.take().ok_or(PipelineError::AlreadyExecuted)?;

        let temp = tempfile::Builder::new().prefix("agelens-").tempdir()?;

        let outcome = self.run(
            temp.path(),
            input,
            input_extension,
            reader.as_mut(),
            writer,
            &mut analyzer,
        );
        reader.close();
        release_workdir(temp);
        outcome
    }

    fn run(
        &mut self,
        workdir: &Path,
        input: &[u8],
        input_extension: &str,
        reader: &mut dyn VideoReader,
        writer: Box<dyn VideoWriter>,
        analyzer: &mut SkipFrameAnalyzer,
    ) -> Result<AnnotatedVideo, PipelineError> {
        let extension = sanitize_extension(input_extension).unwrap_or("bin");
        let input_path = workdir.join(format!("input.{extension}"));
        std::fs::write(&input_path, input)?;

        let metadata = reader
            .open(&input_path)
            .map_err(|e| PipelineError::VideoDecode(e.to_string()))?;
        self.logger.info(&format!(
            "Input: {}x{} @ {} fps, ~{} frames ({})",
            metadata.width, metadata.height, metadata.frame_rate, metadata.total_frames, metadata.codec
        ));

        let output_path = workdir.join(format!("output.{}", self.container));
        let mut reassembler = VideoReassembler::open(writer, &output_path, &metadata)?;

        let total = metadata.total_frames;
        let mut frames = reader.frames();
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(PipelineError::Cancelled);
            }

            let started = Instant::now();
            let Some(item) = frames.next() else { break };
            let mut frame = item.map_err(|e| PipelineError::VideoDecode(e.to_string()))?;
            self.logger.timing(stage::DECODE, elapsed_ms(started));

            let started = Instant::now();
            if analyzer.advance(&frame)? {
                self.logger.timing(stage::DETECT, elapsed_ms(started));
                let faces = analyzer.cached().map_or(0, |r| r.len());
                self.logger.metric("faces", faces as f64);
            }

            let started = Instant::now();
            self.annotator
                .annotate(&mut frame, analyzer.cached())
                .map_err(|e| PipelineError::frame(frame.index(), e))?;
            self.logger.timing(stage::ANNOTATE, elapsed_ms(started));

            let started = Instant::now();
            reassembler.push(&frame)?;
            self.logger.timing(stage::ENCODE, elapsed_ms(started));

            let done = reassembler.frames_written();
            self.logger.progress(done, total);
            if let Some(on_progress) = &self.on_progress {
                if !on_progress(done, total) {
                    return Err(PipelineError::Cancelled);
                }
            }
        }
        drop(frames);

        let frame_count = reassembler.frames_written();
        if frame_count == 0 {
            return Err(PipelineError::VideoDecode("video contains no frames".into()));
        }

        let started = Instant::now();
        let bytes = reassembler.finish()?;
        self.logger.timing(stage::ENCODE, elapsed_ms(started));
        self.logger.summary();

        Ok(AnnotatedVideo {
            bytes,
            frame_rate: metadata.frame_rate,
            frames: frame_count,
        })
    }
}

/// Removes the staging directory. Failure is logged and never replaces the
/// pipeline's own result. Returns whether the directory is gone.
fn release_workdir(temp: tempfile::TempDir) -> bool {
    let path = temp.path().to_path_buf();
    match temp.close() {
        Ok(()) => true,
        Err(e) => {
            log::warn!(
                "Could not remove temporary directory {}: {e}",
                path.display()
            );
            false
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn sanitize_extension(ext: &str) -> Option<&str> {
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::face_analyzer::tests::{
        analyzer, FailingLocalizer, FixedLocalizer, WidthClassifier,
    };
    use crate::pipeline::face_analyzer::FaceAnalyzer;
    use crate::pipeline::video_reassembler::tests::{metadata, StubWriter};
    use crate::shared::detection_result::DetectionResult;
    use crate::shared::frame::Frame;
    use crate::shared::region::FaceRegion;
    use crate::shared::video_metadata::VideoMetadata;
    use std::path::PathBuf;
    use std::sync::Mutex;

    // --- Stubs ---

    struct StubReader {
        frames: Vec<Frame>,
        rate: FrameRate,
        fail_open: bool,
        wipe_workdir_on_close: bool,
        opened_path: Arc<Mutex<Option<PathBuf>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl StubReader {
        fn new(count: usize) -> Self {
            Self {
                frames: (0..count).map(make_frame).collect(),
                rate: FrameRate::from_integer(25).unwrap(),
                fail_open: false,
                wipe_workdir_on_close: false,
                opened_path: Arc::new(Mutex::new(None)),
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            *self.opened_path.lock().unwrap() = Some(path.to_path_buf());
            if self.fail_open {
                return Err("moov atom not found".into());
            }
            let mut meta = metadata(self.rate);
            meta.total_frames = self.frames.len();
            Ok(meta)
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new(self.frames.drain(..).map(Ok))
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
            if self.wipe_workdir_on_close {
                let opened = self.opened_path.lock().unwrap().clone();
                if let Some(dir) = opened.as_deref().and_then(Path::parent) {
                    std::fs::remove_dir_all(dir).unwrap();
                }
            }
        }
    }

    /// Records, per frame, how many regions it was asked to draw.
    struct RecordingAnnotator {
        calls: Arc<Mutex<Vec<(usize, Option<usize>)>>>,
    }

    impl FrameAnnotator for RecordingAnnotator {
        fn annotate(
            &self,
            frame: &mut Frame,
            result: Option<&DetectionResult>,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.calls
                .lock()
                .unwrap()
                .push((frame.index(), result.map(DetectionResult::len)));
            Ok(())
        }
    }

    // --- Helpers ---

    fn make_frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 16 * 16 * 3], 16, 16, 3, index)
    }

    fn use_case(reader: StubReader, writer: StubWriter, analyzer: FaceAnalyzer) -> AnnotateVideoUseCase {
        AnnotateVideoUseCase::new(
            Box::new(reader),
            Box::new(writer),
            SkipFrameAnalyzer::new(analyzer, 6).unwrap(),
            Arc::new(RecordingAnnotator {
                calls: Arc::new(Mutex::new(Vec::new())),
            }),
            "mp4",
        )
    }

    // --- Tests ---

    #[test]
    fn test_every_frame_written_in_order() {
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let result = use_case(StubReader::new(13), writer, analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap();

        assert_eq!(result.frames, 13);
        assert_eq!(result.bytes.len(), 13);
        let indices: Vec<usize> = written.lock().unwrap().iter().map(Frame::index).collect();
        assert_eq!(indices, (0..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_frame_rate_preserved() {
        let mut reader = StubReader::new(3);
        reader.rate = FrameRate::new(30000, 1001).unwrap();
        let writer = StubWriter::new();
        let opened = writer.opened_rate.clone();

        let result = use_case(reader, writer, analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap();

        assert_eq!(result.frame_rate, FrameRate::new(30000, 1001).unwrap());
        assert_eq!(*opened.lock().unwrap(), Some(result.frame_rate));
    }

    #[test]
    fn test_container_clock_rate_reported_unchanged() {
        let mut reader = StubReader::new(4);
        reader.rate = FrameRate::new(27090000, 903003).unwrap();
        let writer = StubWriter::new();
        let opened = writer.opened_rate.clone();

        let result = use_case(reader, writer, analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap();

        assert_eq!(result.frame_rate, FrameRate::new(27090000, 903003).unwrap());
        assert_eq!(*opened.lock().unwrap(), Some(result.frame_rate));
        assert_eq!(result.frames, 4);
    }

    #[test]
    fn test_release_workdir_reports_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::remove_dir_all(temp.path()).unwrap();
        assert!(!release_workdir(temp));

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().to_path_buf();
        assert!(release_workdir(temp));
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_failure_keeps_successful_result() {
        let mut reader = StubReader::new(3);
        reader.wipe_workdir_on_close = true;
        let opened = reader.opened_path.clone();

        let result = use_case(reader, StubWriter::new(), analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap();

        assert_eq!(result.frames, 3);
        let input = opened.lock().unwrap().clone().unwrap();
        assert!(!input.parent().unwrap().exists());
    }

    #[test]
    fn test_detection_runs_every_sixth_frame_and_cache_covers_the_rest() {
        let localizer = FixedLocalizer::new(vec![FaceRegion::new(2, 2, 8, 8)]);
        let calls = localizer.calls.clone();
        let face_analyzer = FaceAnalyzer::new(
            Arc::new(localizer),
            Arc::new(WidthClassifier { fail_below: 0 }),
        );
        let drawn = Arc::new(Mutex::new(Vec::new()));
        let mut uc = AnnotateVideoUseCase::new(
            Box::new(StubReader::new(13)),
            Box::new(StubWriter::new()),
            SkipFrameAnalyzer::new(face_analyzer, 6).unwrap(),
            Arc::new(RecordingAnnotator {
                calls: drawn.clone(),
            }),
            "mp4",
        );

        uc.execute(b"video", "mp4").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let drawn = drawn.lock().unwrap();
        assert_eq!(drawn.len(), 13);
        assert!(drawn.iter().all(|&(_, n)| n == Some(1)));
    }

    #[test]
    fn test_zero_frames_is_decode_error() {
        let err = use_case(StubReader::new(0), StubWriter::new(), analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap_err();
        assert!(matches!(err, PipelineError::VideoDecode(_)));
    }

    #[test]
    fn test_unopenable_container_is_decode_error_and_cleans_up() {
        let mut reader = StubReader::new(3);
        reader.fail_open = true;
        let opened = reader.opened_path.clone();

        let err = use_case(reader, StubWriter::new(), analyzer(vec![]))
            .execute(b"garbage", "mp4")
            .unwrap_err();

        assert!(matches!(err, PipelineError::VideoDecode(_)));
        let path = opened.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn test_temp_dir_removed_after_success() {
        let reader = StubReader::new(2);
        let opened = reader.opened_path.clone();

        use_case(reader, StubWriter::new(), analyzer(vec![]))
            .execute(b"video", "mov")
            .unwrap();

        let path = opened.lock().unwrap().clone().unwrap();
        assert_eq!(path.extension().unwrap(), "mov");
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn test_odd_extension_falls_back() {
        let reader = StubReader::new(1);
        let opened = reader.opened_path.clone();

        use_case(reader, StubWriter::new(), analyzer(vec![]))
            .execute(b"video", "../x")
            .unwrap();

        let path = opened.lock().unwrap().clone().unwrap();
        assert_eq!(path.file_name().unwrap(), "input.bin");
    }

    #[test]
    fn test_cancellation_via_atomic_bool() {
        let reader = StubReader::new(5);
        let closed = reader.closed.clone();
        let opened = reader.opened_path.clone();
        let flag = Arc::new(AtomicBool::new(true));

        let err = use_case(reader, StubWriter::new(), analyzer(vec![]))
            .with_cancel_flag(flag)
            .execute(b"video", "mp4")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(*closed.lock().unwrap());
        assert!(!opened.lock().unwrap().clone().unwrap().parent().unwrap().exists());
    }

    #[test]
    fn test_cancel_via_on_progress() {
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let err = use_case(StubReader::new(10), writer, analyzer(vec![]))
            .with_progress(Box::new(|done, _total| done < 3))
            .execute(b"video", "mp4")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(written.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_progress_reports_running_count() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        use_case(StubReader::new(4), StubWriter::new(), analyzer(vec![]))
            .with_progress(Box::new(move |done, total| {
                sink.lock().unwrap().push((done, total));
                true
            }))
            .execute(b"video", "mp4")
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn test_localizer_failure_fails_whole_video() {
        let reader = StubReader::new(4);
        let closed = reader.closed.clone();
        let face_analyzer = FaceAnalyzer::new(
            Arc::new(FailingLocalizer),
            Arc::new(WidthClassifier { fail_below: 0 }),
        );

        let err = use_case(reader, StubWriter::new(), face_analyzer)
            .execute(b"video", "mp4")
            .unwrap_err();

        assert!(matches!(err, PipelineError::FrameProcessing { index: 0, .. }));
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_finalize_failure_is_encode_error() {
        let mut writer = StubWriter::new();
        writer.fail_close = true;

        let err = use_case(StubReader::new(2), writer, analyzer(vec![]))
            .execute(b"video", "mp4")
            .unwrap_err();
        assert!(matches!(err, PipelineError::VideoEncode(_)));
    }

    #[test]
    fn test_second_execute_fails() {
        let mut uc = use_case(StubReader::new(1), StubWriter::new(), analyzer(vec![]));
        uc.execute(b"video", "mp4").unwrap();
        assert!(matches!(
            uc.execute(b"video", "mp4"),
            Err(PipelineError::AlreadyExecuted)
        ));
    }

    #[test]
    fn test_end_to_end_with_ffmpeg() {
        use crate::annotation::infrastructure::box_label_annotator::BoxLabelAnnotator;
        use approx::assert_relative_eq;
        use crate::shared::settings::{AnnotationStyle, VideoCodec};
        use crate::video::infrastructure::ffmpeg_reader::tests::create_test_video;
        use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
        use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        let rate = FrameRate::from_integer(25).unwrap();
        create_test_video(&source, 8, 64, 48, rate);
        let bytes = std::fs::read(&source).unwrap();

        let mut uc = AnnotateVideoUseCase::new(
            Box::new(FfmpegReader::new()),
            Box::new(FfmpegWriter::new(VideoCodec::Mpeg4)),
            SkipFrameAnalyzer::new(analyzer(vec![FaceRegion::new(8, 8, 20, 20)]), 6).unwrap(),
            Arc::new(BoxLabelAnnotator::new(AnnotationStyle::default()).unwrap()),
            "mp4",
        );
        let result = uc.execute(&bytes, "mp4").unwrap();
        assert_eq!(result.frames, 8);
        assert_relative_eq!(result.frame_rate.as_f64(), 25.0, epsilon = 0.01);

        let output = dir.path().join("annotated.mp4");
        std::fs::write(&output, &result.bytes).unwrap();
        let mut reader = FfmpegReader::new();
        let meta = reader.open(&output).unwrap();
        assert_eq!((meta.width, meta.height), (64, 48));
        assert_relative_eq!(meta.fps(), 25.0, epsilon = 0.01);
        let decoded = reader.frames().filter(|f| f.is_ok()).count();
        reader.close();
        assert_eq!(decoded, 8);
    }
}
