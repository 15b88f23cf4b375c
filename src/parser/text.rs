//! Text Recovery
//!
//! レガシーXLSエンジンが返す文字列の文字化けを回復するためのデコードチェーン。
//!
//! コードページ情報が誤っているXLSファイルでは、本来のバイト列が1バイト1文字として
//! 展開された文字列（U+0000〜U+00FFのみで構成される文字列）が返されます。
//! このような文字列をバイト列に戻し、UTF-8 → GBK → Latin-1の順にデコードを試みます。
//! 最後のLatin-1は全バイト値を受け付けるため、チェーンは必ず成功します。
//!
//! 正しくデコード済みのLatin-1文字列（"Größe"など）もこの形をしているため、
//! GBKの結果は、Latin-1としての読みが不自然で、かつ非ASCII文字がすべてCJKの場合に限り採用します。

use std::borrow::Cow;

use encoding_rs::GBK;

/// バイト列をデコードチェーンで文字列化
///
/// # 引数
///
/// * `bytes` - デコード対象のバイト列
///
/// # 戻り値
///
/// デコードされた文字列（失敗することはありません）
pub(crate) fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    if gbk_plausible(bytes) && !latin1_plausible(bytes) {
        if let Some(s) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
            if s.chars().any(is_cjk) && s.chars().all(|c| c.is_ascii() || is_cjk(c)) {
                return s.into_owned();
            }
        }
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// 文字化けの疑いがある文字列を回復
///
/// 1バイト1文字として展開された文字列でない場合は、そのまま返します。
pub(crate) fn recover_text(s: &str) -> Cow<'_, str> {
    if !is_byte_shaped(s) {
        return Cow::Borrowed(s);
    }

    let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
    Cow::Owned(decode_bytes(&bytes))
}

/// すべての文字がU+00FF以下で、かつ非ASCII文字を含むかどうか
fn is_byte_shaped(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF) && s.chars().any(|c| (c as u32) >= 0x80)
}

/// GBKとして解釈する価値があるかどうか
///
/// 上位バイトの連続は偶数長である必要があります（2バイト文字の組）。
/// 単独の上位バイト（例: "Müller"のü）はLatin-1として扱います。
fn gbk_plausible(bytes: &[u8]) -> bool {
    let mut run = 0usize;
    for &b in bytes {
        if b >= 0x80 {
            run += 1;
        } else {
            if run % 2 != 0 {
                return false;
            }
            run = 0;
        }
    }
    run % 2 == 0
}

/// Latin-1の文章として自然かどうか
///
/// 非ASCII文字がすべてアクセント付きの英字で、その連続が2文字以内、
/// かつASCII英字に隣接している場合に自然とみなします（例: "Größe", "señor"）。
fn latin1_plausible(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] < 0x80 {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && bytes[i] >= 0x80 {
            if !is_latin1_letter(bytes[i]) {
                return false;
            }
            i += 1;
        }

        let touches_letter = (start > 0 && bytes[start - 1].is_ascii_alphabetic())
            || (i < bytes.len() && bytes[i].is_ascii_alphabetic());
        if i - start > 2 || !touches_letter {
            return false;
        }
    }
    true
}

/// U+00C0〜U+00FFの英字（×と÷を除く）
fn is_latin1_letter(b: u8) -> bool {
    b >= 0xC0 && b != 0xD7 && b != 0xF7
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F   // 句読点
        | 0x3400..=0x4DBF // 拡張A
        | 0x4E00..=0x9FFF // 統合漢字
        | 0xFF00..=0xFFEF // 全角
    )
}
