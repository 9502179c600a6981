//! The words a drawer can be asked to draw.

use rand::Rng;

/// Every round picks its word from this list.
pub const WORD_BANK: [&str; 20] = [
    "苹果", "香蕉", "汽车", "飞机", "大象", "篮球", "电脑", "雨伞", "书本", "鞋子",
    "火车", "自行车", "手机", "手表", "帽子", "眼镜", "吉他", "蛋糕", "钥匙", "房子",
];

/// Picks a word uniformly at random. Repeats across rounds are allowed.
pub fn pick_word<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    WORD_BANK[rng.random_range(0..WORD_BANK.len())]
}
