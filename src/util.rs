//! 通用工具函数：原地 URL 解码、查询字符串拆分、不区分大小写的后缀匹配。
//!
//! 这些函数都直接在调用方提供的缓冲区上工作，不进行任何堆分配。

use crate::param::{Classification, CLASSIFICATIONS};

/// 一个已经解码的名称/值对。
///
/// `value` 为 `None` 表示原始字符串中该名称后面没有 `=`，
/// 与值为空字符串（`Some(b"")`）的情形是不同的。
#[derive(Debug, PartialEq, Eq)]
pub struct QueryPair<'a> {
    pub name: &'a [u8],
    pub value: Option<&'a [u8]>,
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// 原地解码 URL 编码的字节串，返回解码后的长度。
///
/// `%XY` 被替换为对应的字节，`+` 被替换为空格。不合法的百分号序列按原样保留。
/// 解码结果永远不会比原串长，所以可以安全地原地进行。
pub fn url_decode(buf: &mut [u8]) -> usize {
    let mut read = 0;
    let mut write = 0;
    while read < buf.len() {
        let c = buf[read];
        match c {
            b'+' => {
                buf[write] = b' ';
                read += 1;
            }
            b'%' if read + 2 < buf.len() => {
                match (hex_value(buf[read + 1]), hex_value(buf[read + 2])) {
                    (Some(hi), Some(lo)) => {
                        buf[write] = (hi << 4) | lo;
                        read += 3;
                    }
                    _ => {
                        buf[write] = c;
                        read += 1;
                    }
                }
            }
            _ => {
                buf[write] = c;
                read += 1;
            }
        }
        write += 1;
    }
    write
}

/// 从未解码的查询字符串中取出下一个名称/值对。
///
/// 初次调用时传入完整的查询字符串，之后传入上一次返回的剩余部分；
/// 剩余部分为 `None` 时表示已经处理完毕。名称与值都在原缓冲区中就地解码。
///
/// 必须先按 `&` 与 `=` 拆分再解码，否则解码出来的 `&`、`=` 会破坏拆分结果。
pub fn next_query_pair(query: &mut [u8]) -> (QueryPair<'_>, Option<&mut [u8]>) {
    let (pair, rest) = match query.iter().position(|&c| c == b'&') {
        Some(amp) => {
            let (pair, rest) = query.split_at_mut(amp);
            (pair, Some(&mut rest[1..]))
        }
        None => (query, None),
    };

    let (name, value) = match pair.iter().position(|&c| c == b'=') {
        Some(eq) => {
            let (name, value) = pair.split_at_mut(eq);
            let value = &mut value[1..];
            let len = url_decode(value);
            let value: &[u8] = value;
            (name, Some(&value[..len]))
        }
        None => (pair, None),
    };
    let len = url_decode(name);
    let name: &[u8] = name;

    (
        QueryPair {
            name: &name[..len],
            value,
        },
        rest,
    )
}

/// 不区分大小写地比较字节串是否相等
pub fn eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// 取出路径中最后一段的后缀（不含 `.`）。目录部分中的 `.` 不算后缀。
pub fn suffix_of(path: &[u8]) -> Option<&[u8]> {
    let name_start = path.iter().rposition(|&c| c == b'/').map_or(0, |p| p + 1);
    let name = &path[name_start..];
    name.iter().rposition(|&c| c == b'.').map(|dot| &name[dot + 1..])
}

/// 在给定的映射表中查找路径对应的内容分类，第一个匹配项优先。
pub fn classify_with(table: &[(&str, Classification)], path: &[u8]) -> Classification {
    if let Some(suffix) = suffix_of(path) {
        for (ext, classification) in table {
            if eq_ignore_case(suffix, ext.as_bytes()) {
                return *classification;
            }
        }
    }
    Classification::OctetStream
}

/// 根据文件后缀确定内容分类，无法识别时返回默认的二进制类型。
pub fn classify(path: &[u8]) -> Classification {
    classify_with(CLASSIFICATIONS, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(s: &str) -> Vec<u8> {
        let mut buf = s.as_bytes().to_vec();
        let len = url_decode(&mut buf);
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_url_decode_basic() {
        assert_eq!(decoded("a%20b.txt"), b"a b.txt");
        assert_eq!(decoded("2+b"), b"2 b");
        assert_eq!(decoded("%41%62c"), b"Abc");
        assert_eq!(decoded("plain"), b"plain");
        assert_eq!(decoded(""), b"");
    }

    /// 不完整或非法的百分号序列保持原样
    #[test]
    fn test_url_decode_invalid_sequences() {
        assert_eq!(decoded("100%"), b"100%");
        assert_eq!(decoded("%4"), b"%4");
        assert_eq!(decoded("%zz"), b"%zz");
        assert_eq!(decoded("%%41"), b"%A");
    }

    #[test]
    fn test_query_pairs() {
        let mut query = b"x=1&y=2%20b".to_vec();
        let (pair, rest) = next_query_pair(&mut query);
        assert_eq!(pair.name, b"x");
        assert_eq!(pair.value, Some(&b"1"[..]));
        let rest = rest.unwrap();
        let (pair, rest) = next_query_pair(rest);
        assert_eq!(pair.name, b"y");
        assert_eq!(pair.value, Some(&b"2 b"[..]));
        assert!(rest.is_none());
    }

    /// 没有 `=` 的名称与值为空字符串的名称是不同的
    #[test]
    fn test_query_pair_without_value() {
        let mut query = b"flag&empty=".to_vec();
        let (pair, rest) = next_query_pair(&mut query);
        assert_eq!(pair.name, b"flag");
        assert_eq!(pair.value, None);
        let (pair, rest) = next_query_pair(rest.unwrap());
        assert_eq!(pair.name, b"empty");
        assert_eq!(pair.value, Some(&b""[..]));
        assert!(rest.is_none());
    }

    /// 编码后的分隔符在拆分之后才被解码，不会产生多余的名称/值对
    #[test]
    fn test_query_encoded_separators() {
        let mut query = b"a%3Db=c%26d".to_vec();
        let (pair, rest) = next_query_pair(&mut query);
        assert_eq!(pair.name, b"a=b");
        assert_eq!(pair.value, Some(&b"c&d"[..]));
        assert!(rest.is_none());
    }

    #[test]
    fn test_trailing_ampersand_yields_empty_pair() {
        let mut query = b"a=1&".to_vec();
        let (_, rest) = next_query_pair(&mut query);
        let (pair, rest) = next_query_pair(rest.unwrap());
        assert_eq!(pair.name, b"");
        assert_eq!(pair.value, None);
        assert!(rest.is_none());
    }

    #[test]
    fn test_suffix_of() {
        assert_eq!(suffix_of(b"/WWW/index.html"), Some(&b"html"[..]));
        assert_eq!(suffix_of(b"/WWW/archive.tar.gz"), Some(&b"gz"[..]));
        assert_eq!(suffix_of(b"/WWW/dir.d/README"), None);
        assert_eq!(suffix_of(b"noslash.TXT"), Some(&b"TXT"[..]));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(b"/WWW/index.html"), Classification::Html);
        assert_eq!(classify(b"/WWW/INDEX.HTM"), Classification::Html);
        assert_eq!(classify(b"/WWW/photo.JPeG"), Classification::Jpeg);
        assert_eq!(classify(b"/WWW/app.js"), Classification::JavaScript);
        assert_eq!(classify(b"/WWW/debug.log"), Classification::Text);
        assert_eq!(classify(b"/WWW/font.woff2"), Classification::Woff2);
        assert_eq!(classify(b"/WWW/data.bin"), Classification::OctetStream);
        assert_eq!(classify(b"/WWW/css.d/styles"), Classification::OctetStream);
    }

    /// 同一后缀出现多次时，表中靠前的项优先
    #[test]
    fn test_classify_first_match_wins() {
        let table = [
            ("jpg", Classification::Jpeg),
            ("JPG", Classification::JavaScript),
        ];
        assert_eq!(classify_with(&table, b"/a.jpg"), Classification::Jpeg);
    }
}
