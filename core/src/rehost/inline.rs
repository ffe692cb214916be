//! 富文本正文中内联图片引用的改写。
//!
//! 只改写 `<img src=...>` 属性值与 Markdown 图片语法 `![alt](url)` 中与原始地址完全一致的引用，
//! 普通链接与正文文字保持不变。

use regex::{Captures, Regex};
use tracing::warn;

use super::TARGET;

/// `<img` 标签内 `src=` 之前的部分，引号内的属性值整体跳过，其中可以出现 `>`。
const HTML_IMAGE_LEAD: &str = r#"(?i:<img\b(?:[^>"']|"[^"]*"|'[^']*')*?\bsrc\s*=\s*["']?)"#;

/// Markdown 图片的 `![alt](`，alt 中允许一层成对的方括号，地址可以写在 `<...>` 中。
const MARKDOWN_IMAGE_LEAD: &str = r"!\[(?:[^\[\]]|\[[^\]]*\])*\]\(\s*<?";

/// 引用结束处：引号、括号、标签结尾、空白或正文末尾。
const REFERENCE_TAIL: &str = r#"(?P<tail>[\s"'>)]|$)"#;

fn image_reference_pattern(origin: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        "(?P<lead>{HTML_IMAGE_LEAD}|{MARKDOWN_IMAGE_LEAD}){}{REFERENCE_TAIL}",
        regex::escape(origin)
    ))
}

/// 将 `body` 中所有指向 `origin` 的图片引用替换为 `replacement`。
pub(crate) fn rewrite_inline_references(body: &str, origin: &str, replacement: &str) -> String {
    if origin.is_empty() || !body.contains(origin) {
        return body.to_string();
    }

    let pattern = match image_reference_pattern(origin) {
        Ok(pattern) => pattern,
        Err(err) => {
            warn!(target: TARGET, origin, %err, "inline reference pattern rejected, body left unchanged");
            return body.to_string();
        }
    };

    pattern
        .replace_all(body, |caps: &Captures<'_>| {
            format!("{}{replacement}{}", &caps["lead"], &caps["tail"])
        })
        .into_owned()
}
