pub mod choices;
pub mod segmenter;

pub use choices::{CHOICE_SCAN_LINES, extract_choices, parse_choice_line};
pub use segmenter::{Boundary, DEFAULT_MAX_CHUNK_CHARS, TextChunk, segment, segment_with_boundaries};
