use proptest::prelude::*;

use renderfleet_core::models::{ChunkStatus, Codec};
use renderfleet_core::orchestration::ChunkOutcome;

/// Frame counts and chunk sizes that plan to at most a few thousand chunks
pub fn frame_plan_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..50_000, 1u64..2_000).prop_filter("bounded chunk count", |(frames, size)| {
        frames.div_ceil(*size) <= 5_000
    })
}

/// Valid caller-supplied job identifiers
pub fn job_id_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,64}"
}

pub fn codec_strategy() -> impl Strategy<Value = Codec> {
    prop_oneof![
        Just(Codec::H264),
        Just(Codec::H265),
        Just(Codec::Vp8),
        Just(Codec::Vp9),
        Just(Codec::Prores),
        Just(Codec::Gif),
        Just(Codec::Mp3),
        Just(Codec::Aac),
        Just(Codec::Wav),
    ]
}

/// Terminal outcome to report for a chunk
pub fn chunk_outcome_strategy() -> impl Strategy<Value = ChunkOutcome> {
    prop_oneof![
        3 => (1u64..5_000).prop_map(|render_time_ms| ChunkOutcome::Rendered {
            output_key: String::new(),
            frames_rendered: 1,
            render_time_ms,
        }),
        1 => "[a-z ]{1,20}".prop_map(|error| ChunkOutcome::Failed { error }),
    ]
}

pub fn is_pending(status: ChunkStatus) -> bool {
    !status.is_terminal()
}
