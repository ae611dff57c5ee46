//! Concrete escaping disciplines, one per named output format.

/// HTML: `& < > " '`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// XML: like HTML but with the standard `&apos;` entity.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// RTF: backslash-escape the three control characters.
pub fn escape_rtf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            _ => out.push(ch),
        }
    }
    out
}

/// URL: RFC 3986 percent-encoding of everything outside the unreserved set,
/// applied to the UTF-8 bytes.
pub fn escape_url(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// JSON string body: quote, backslash and control characters, with `</`
/// broken as `<\/` so the result stays safe inside `<script>` blocks.
pub fn escape_json_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = '\0';
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '/' if prev == '<' => out.push_str("\\/"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
        prev = ch;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escapes_the_five_specials() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn xml_uses_apos() {
        assert_eq!(escape_xml("it's"), "it&apos;s");
    }

    #[test]
    fn rtf_escapes_braces_and_backslash() {
        assert_eq!(escape_rtf(r"{\b bold}"), r"\{\\b bold\}");
    }

    #[test]
    fn url_percent_encodes_utf8_bytes() {
        assert_eq!(escape_url("a b"), "a%20b");
        assert_eq!(escape_url("~x-y_z.0"), "~x-y_z.0");
        assert_eq!(escape_url("é"), "%C3%A9");
    }

    #[test]
    fn json_string_breaks_closing_tags() {
        assert_eq!(escape_json_string("</script>"), "<\\/script>");
        assert_eq!(escape_json_string("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
