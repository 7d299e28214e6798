//! 礼品卡卡号生成
//!
//! 格式 `GC-XXXX-XXXX`，字符集去掉易混淆的 0/O/1/I/L。
//! 唯一性由存储层的唯一索引保证。

use rand::Rng;

const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const GROUP_LEN: usize = 4;

/// 生成一个新卡号
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    let mut group = || -> String {
        (0..GROUP_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    format!("GC-{first}-{second}")
}

/// 规范化用户输入的卡号（去空白、转大写）
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}
