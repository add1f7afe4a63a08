//! Lazy markup token stream over a byte reader.
//!
//! Wraps html5ever's push tokenizer and turns it into a pull-style
//! [`Iterator`]: bytes are read from the underlying reader only when the
//! consumer asks for a token that is not buffered yet, so a consumer that
//! stops early (at `</head>`) never reads the rest of the page.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};

use html5ever::tendril::fmt::UTF8;
use html5ever::tendril::stream::{TendrilSink, Utf8LossyDecoder};
use html5ever::tendril::{ByteTendril, StrTendril};
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, TagKind, Token as HtmlToken, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};
use thiserror::Error;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A start or self-closing tag with its attributes.
///
/// Tag and attribute names are lowercase. When an attribute is repeated the
/// first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attrs: HashMap<String, String>,
}

impl Tag {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("end of stream")]
    Eof,

    #[error("failed to read page body: {0}")]
    Read(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag(Tag),
    EndTag(String),
    SelfClosingTag(Tag),
    Text(String),
    Error(TokenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Reading,
    Drained,
    Closed,
}

/// Collects html5ever tokens into our own token type.
#[derive(Default)]
struct TokenCollector {
    tokens: VecDeque<Token>,
}

impl TokenCollector {
    fn push_text(&mut self, text: &str) {
        if let Some(Token::Text(last)) = self.tokens.back_mut() {
            last.push_str(text);
        } else {
            self.tokens.push_back(Token::Text(text.to_string()));
        }
    }
}

impl TokenSink for TokenCollector {
    type Handle = ();

    fn process_token(&mut self, token: HtmlToken, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            HtmlToken::TagToken(tag) => {
                let name = tag.name.to_string();
                let mut attrs = HashMap::with_capacity(tag.attrs.len());
                for attr in tag.attrs {
                    attrs
                        .entry(attr.name.local.to_string())
                        .or_insert_with(|| attr.value.to_string());
                }

                match tag.kind {
                    TagKind::EndTag => self.tokens.push_back(Token::EndTag(name)),
                    TagKind::StartTag if tag.self_closing => {
                        self.tokens
                            .push_back(Token::SelfClosingTag(Tag { name, attrs }));
                    }
                    TagKind::StartTag => {
                        let next_state = content_state(&name);
                        self.tokens.push_back(Token::StartTag(Tag { name, attrs }));
                        return next_state;
                    }
                }
            }
            HtmlToken::CharacterTokens(text) => self.push_text(&text),
            HtmlToken::NullCharacterToken => self.push_text("\0"),
            // Comments, doctypes, recoverable parse errors and the
            // tokenizer's own EOF carry nothing we scan for.
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Elements whose content is text, not markup.
fn content_state(tag_name: &str) -> TokenSinkResult<()> {
    match tag_name {
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "plaintext" => TokenSinkResult::Plaintext,
        _ => TokenSinkResult::Continue,
    }
}

/// Text decoded from the body so far and not yet handed to the tokenizer.
///
/// Malformed or truncated byte sequences arrive here already replaced with
/// U+FFFD, so decoder errors carry nothing further.
#[derive(Default)]
struct DecodedText {
    text: StrTendril,
}

impl TendrilSink<UTF8> for DecodedText {
    fn process(&mut self, t: StrTendril) {
        self.text.push_tendril(&t);
    }

    fn error(&mut self, _desc: Cow<'static, str>) {}

    type Output = StrTendril;

    fn finish(self) -> StrTendril {
        self.text
    }
}

/// Lazy, single-pass token sequence over `reader`.
///
/// Adjacent character data is coalesced into one [`Token::Text`]. The
/// sequence ends with exactly one [`Token::Error`]: [`TokenError::Eof`] at
/// the normal end of input, or [`TokenError::Read`] if the reader fails.
/// After that `next` returns `None`.
pub struct HtmlTokens<R> {
    reader: R,
    buf: Vec<u8>,
    tokenizer: Tokenizer<TokenCollector>,
    input: BufferQueue,
    /// Taken when the input is finished.
    decoder: Option<Utf8LossyDecoder<DecodedText>>,
    state: SourceState,
}

impl<R: Read> HtmlTokens<R> {
    pub fn new(reader: R) -> Self {
        HtmlTokens {
            reader,
            buf: vec![0; READ_CHUNK_SIZE],
            tokenizer: Tokenizer::new(TokenCollector::default(), TokenizerOpts::default()),
            input: BufferQueue::new(),
            decoder: Some(Utf8LossyDecoder::new(DecodedText::default())),
            state: SourceState::Reading,
        }
    }

    fn pop_ready(&mut self) -> Option<Token> {
        let tokens = &mut self.tokenizer.sink.tokens;
        // Trailing text may continue in the next chunk.
        let incomplete_text = self.state == SourceState::Reading
            && tokens.len() == 1
            && matches!(tokens.front(), Some(Token::Text(_)));
        if incomplete_text {
            None
        } else {
            tokens.pop_front()
        }
    }

    fn feed_bytes(&mut self, len: usize) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        decoder.process(ByteTendril::from_slice(&self.buf[..len]));
        let text = std::mem::take(&mut decoder.inner_sink.text);
        self.feed_text(text);
    }

    fn feed_text(&mut self, text: StrTendril) {
        if text.is_empty() {
            return;
        }
        self.input.push_back(text);
        let _ = self.tokenizer.feed(&mut self.input);
    }

    fn finish(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            let rest = decoder.finish();
            self.feed_text(rest);
        }
        self.tokenizer.end();
        self.state = SourceState::Drained;
    }
}

impl<R: Read> Iterator for HtmlTokens<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if self.state == SourceState::Closed {
                return None;
            }
            if let Some(token) = self.pop_ready() {
                return Some(token);
            }
            if self.state == SourceState::Drained {
                self.state = SourceState::Closed;
                return Some(Token::Error(TokenError::Eof));
            }

            match self.reader.read(&mut self.buf) {
                Ok(0) => self.finish(),
                Ok(n) => self.feed_bytes(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = SourceState::Closed;
                    return Some(Token::Error(TokenError::Read(e.to_string())));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(html: &str) -> Vec<Token> {
        HtmlTokens::new(html.as_bytes()).collect()
    }

    fn start(name: &str, attrs: &[(&str, &str)]) -> Token {
        Token::StartTag(Tag {
            name: name.into(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Hands out its input a few bytes at a time.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(self.data.len()).min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Yields `data` once, then fails.
    struct Broken<'a> {
        data: Option<&'a [u8]>,
    }

    impl Read for Broken<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            }
        }
    }

    #[test]
    fn emits_tags_text_and_eof() {
        assert_eq!(
            tokens("<head><title>Hello</title></head>"),
            vec![
                start("head", &[]),
                start("title", &[]),
                Token::Text("Hello".into()),
                Token::EndTag("title".into()),
                Token::EndTag("head".into()),
                Token::Error(TokenError::Eof),
            ]
        );
    }

    #[test]
    fn distinguishes_self_closing_tags() {
        let toks = tokens(r#"<meta property="og:title" content="T"/><meta name="x">"#);
        assert!(matches!(&toks[0], Token::SelfClosingTag(tag) if tag.attr("content") == Some("T")));
        assert!(matches!(&toks[1], Token::StartTag(tag) if tag.attr("name") == Some("x")));
    }

    #[test]
    fn lowercases_tag_and_attribute_names() {
        let toks = tokens(r#"<META NAME="Author" CONTENT="Ann">"#);
        assert_eq!(toks[0], start("meta", &[("name", "Author"), ("content", "Ann")]));
    }

    #[test]
    fn title_content_is_text_not_markup() {
        let toks = tokens("<title>a <b> &amp; c</title>");
        assert_eq!(toks[1], Token::Text("a <b> & c".into()));
        assert_eq!(toks[2], Token::EndTag("title".into()));
    }

    #[test]
    fn script_content_is_not_tokenized_as_tags() {
        let toks = tokens(r#"<script>var s = '<meta property="og:title" content="x">';</script>"#);
        assert_eq!(toks.len(), 4);
        assert!(matches!(&toks[1], Token::Text(_)));
    }

    #[test]
    fn coalesces_text_split_across_reads() {
        let html = "<title>Caf\u{e9} society</title>";
        let toks: Vec<Token> = HtmlTokens::new(Trickle {
            data: html.as_bytes(),
            step: 3,
        })
        .collect();
        assert_eq!(toks[1], Token::Text("Caf\u{e9} society".into()));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let toks: Vec<Token> = HtmlTokens::new(&b"<title>a\xffb</title>"[..]).collect();
        assert_eq!(toks[1], Token::Text("a\u{fffd}b".into()));
    }

    #[test]
    fn truncated_utf8_at_end_of_input_is_replaced() {
        let toks: Vec<Token> = HtmlTokens::new(&b"<title>caf\xc3"[..]).collect();
        assert_eq!(toks[1], Token::Text("caf\u{fffd}".into()));
        assert_eq!(toks.last(), Some(&Token::Error(TokenError::Eof)));
    }

    #[test]
    fn read_failure_ends_sequence_with_error() {
        let toks: Vec<Token> = HtmlTokens::new(Broken {
            data: Some(b"<head>"),
        })
        .collect();
        assert_eq!(toks.first(), Some(&start("head", &[])));
        assert!(matches!(toks.last(), Some(Token::Error(TokenError::Read(_)))));
    }

    #[test]
    fn is_not_restartable() {
        let mut toks = HtmlTokens::new(&b"<p>"[..]);
        assert_eq!(toks.next(), Some(start("p", &[])));
        assert_eq!(toks.next(), Some(Token::Error(TokenError::Eof)));
        assert_eq!(toks.next(), None);
        assert_eq!(toks.next(), None);
    }

    #[test]
    fn empty_input_yields_only_eof() {
        assert_eq!(tokens(""), vec![Token::Error(TokenError::Eof)]);
    }
}
