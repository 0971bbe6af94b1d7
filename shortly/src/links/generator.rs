use rand::Rng;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const LENGTH: usize = 8;

/// Generates a random base62 short code of length 8
pub fn generate_short_code() -> String {
    let mut rng = rand::thread_rng();
    let mut result = String::with_capacity(LENGTH);

    for _ in 0..LENGTH {
        let idx = rng.gen_range(0..62);
        result.push(BASE62_CHARS[idx] as char);
    }

    result
}
