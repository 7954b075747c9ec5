//! Reversal of the fixed-key XOR obfuscation some portals apply to stream URLs.
//!
//! Phim1080 and Vuighe ship their HLS links with every character XOR-ed
//! against a small integer key (69 on both sites). The transform is its own
//! inverse, so the same function encodes and decodes.

/// XOR every code point of `payload` with `key`.
///
/// Total on any input: the key is a `u8`, so only the low eight bits of each
/// code point change. Both the surrogate gap (`0xD800..=0xDFFF`) and the top of
/// the Unicode range are 256-aligned, which keeps every output a valid `char`.
/// Length in characters and ordering are preserved.
///
/// Nothing here checks that the output is a URL; callers should run
/// [`looks_like_media_url`] (or their own check) before trusting it.
pub fn xor_decode(payload: &str, key: u8) -> String {
    payload
        .chars()
        .map(|c| {
            let code = u32::from(c) ^ u32::from(key);
            // Unreachable for valid input, kept total rather than panicking.
            char::from_u32(code).unwrap_or(c)
        })
        .collect()
}

/// Returns `true` if `value` names an HLS manifest or a progressive MP4.
pub fn looks_like_media_url(value: &str) -> bool {
    value.contains(".m3u8") || value.contains(".mp4")
}
