pub mod annotate_images_use_case;
pub mod annotate_video_use_case;
pub mod archive;
pub mod face_analyzer;
pub mod pipeline_logger;
pub mod skip_frame_analyzer;
pub mod streaming_session;
pub mod video_reassembler;
