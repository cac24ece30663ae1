//! Formatting helpers for Telegram HTML parse mode.

/// Telegram's cap on the text of one message. Lengths here are counted in
/// bytes, which never undercounts Telegram's own measure.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Shorten `s` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_label(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Join self-contained HTML blocks with `sep` into messages of at most
/// `limit` bytes. Blocks are never split unless one alone exceeds `limit`.
pub fn pack_html_blocks<S: AsRef<str>>(blocks: &[S], sep: &str, limit: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();

    for block in blocks {
        let block = block.as_ref();
        if !page.is_empty() && page.len() + sep.len() + block.len() <= limit {
            page.push_str(sep);
            page.push_str(block);
            continue;
        }

        if !page.is_empty() {
            pages.push(std::mem::take(&mut page));
        }
        if block.len() <= limit {
            page.push_str(block);
        } else {
            pages.extend(split_html_chunks(block, limit));
        }
    }

    if !page.is_empty() {
        pages.push(page);
    }
    pages
}

/// Split `html` into chunks of at most `limit` bytes.
///
/// Breaks prefer line ends. Tags open at a break are closed at the end of the
/// chunk and reopened at the start of the next one, and entities such as
/// `&amp;` are never cut.
pub fn split_html_chunks(html: &str, limit: usize) -> Vec<String> {
    if html.len() <= limit {
        return vec![html.to_string()];
    }

    let mut splitter = HtmlSplitter {
        limit,
        out: Vec::new(),
        chunk: String::new(),
        stack: Vec::new(),
    };
    for token in tokenize_html(html) {
        match token {
            HtmlToken::Tag(t) => splitter.push_tag(t),
            HtmlToken::Text(t) => splitter.push_text(t),
        }
    }
    splitter.flush();
    splitter.out
}

#[derive(Clone, Debug)]
struct HtmlTag {
    name: String,
    open: String,
}

impl HtmlTag {
    fn close_len(&self) -> usize {
        self.name.len() + 3
    }
}

#[derive(Clone, Copy, Debug)]
enum HtmlToken<'a> {
    Tag(&'a str),
    Text(&'a str),
}

fn tokenize_html(mut s: &str) -> Vec<HtmlToken<'_>> {
    let mut out = Vec::new();
    while !s.is_empty() {
        match s.find('<') {
            Some(0) => match s.find('>') {
                Some(end) => {
                    out.push(HtmlToken::Tag(&s[..=end]));
                    s = &s[end + 1..];
                }
                None => {
                    out.push(HtmlToken::Text(s));
                    break;
                }
            },
            Some(start) => {
                out.push(HtmlToken::Text(&s[..start]));
                s = &s[start..];
            }
            None => {
                out.push(HtmlToken::Text(s));
                break;
            }
        }
    }
    out
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Apply an opening or closing tag to the stack of currently open tags.
fn apply_tag(stack: &mut Vec<HtmlTag>, tag: &str) {
    let name = tag_name(tag);
    if name.is_empty() || tag.ends_with("/>") {
        return;
    }
    if tag.starts_with("</") {
        if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
            stack.truncate(pos);
        }
    } else {
        stack.push(HtmlTag {
            name,
            open: tag.to_string(),
        });
    }
}

struct HtmlSplitter {
    limit: usize,
    out: Vec<String>,
    chunk: String,
    stack: Vec<HtmlTag>,
}

impl HtmlSplitter {
    fn open_len(&self) -> usize {
        self.stack.iter().map(|t| t.open.len()).sum()
    }

    fn close_len(stack: &[HtmlTag]) -> usize {
        stack.iter().map(HtmlTag::close_len).sum()
    }

    fn has_content(&self) -> bool {
        self.chunk.len() > self.open_len()
    }

    fn room(&self) -> usize {
        self.limit
            .saturating_sub(self.chunk.len() + Self::close_len(&self.stack))
    }

    /// Close the current chunk and start the next one with the open tags.
    fn flush(&mut self) {
        if self.has_content() {
            let mut msg = std::mem::take(&mut self.chunk);
            for t in self.stack.iter().rev() {
                msg.push_str("</");
                msg.push_str(&t.name);
                msg.push('>');
            }
            self.out.push(msg);
        }
        self.chunk.clear();
        for t in &self.stack {
            self.chunk.push_str(&t.open);
        }
    }

    fn push_tag(&mut self, tag: &str) {
        let mut next = self.stack.clone();
        apply_tag(&mut next, tag);
        let limit = self.limit;
        let fits = |chunk: &String| chunk.len() + tag.len() + Self::close_len(&next) <= limit;

        if !fits(&self.chunk) && self.has_content() {
            self.flush();
        }
        // A tag that cannot fit even into a fresh chunk is dropped.
        if !fits(&self.chunk) {
            return;
        }
        self.chunk.push_str(tag);
        self.stack = next;
    }

    fn push_text(&mut self, text: &str) {
        for line in text.split_inclusive('\n') {
            let mut rest = line;
            while !rest.is_empty() {
                let room = self.room();
                if rest.len() <= room {
                    self.chunk.push_str(rest);
                    break;
                }
                if self.has_content() {
                    self.flush();
                    continue;
                }

                let (head, tail) = split_text(rest, room);
                if head.is_empty() {
                    return;
                }
                self.chunk.push_str(head);
                self.flush();
                rest = tail;
            }
        }
    }
}

/// Cut `s` after at most `max` bytes, on a char boundary and outside entities.
fn split_text(s: &str, max: usize) -> (&str, &str) {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if let Some(amp) = s[..cut].rfind('&') {
        if !s[amp..cut].contains(';') {
            cut = amp;
        }
    }
    s.split_at(cut)
}
