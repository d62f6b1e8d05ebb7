pub use video_import::test_support::{write_frame, write_frames, BOARD_AT, CELL};
