use vnlink::decode::{looks_like_media_url, xor_decode};

pub fn cmd_decode(payload: &str, key: u8) {
    let decoded = xor_decode(payload, key);
    println!("{decoded}");
    if !looks_like_media_url(&decoded) {
        eprintln!("warning: decoded text does not look like a stream URL");
    }
}
