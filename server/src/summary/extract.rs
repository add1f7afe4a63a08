use tracing::{debug, trace};

use super::resolve::resolve_link;
use super::tokenizer::{Tag, Token, TokenError};
use super::ExtractError;
use crate::models::{PageSummary, PreviewImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    /// A `<title>` start tag was seen while the title was still unset; the
    /// next token supplies it if it is text.
    AwaitingTitle,
    Done,
}

/// Incrementally builds a [`PageSummary`] from head tokens.
///
/// Images are kept as an ordered list plus the index of the record that
/// `og:image:*` detail properties currently apply to.
struct SummaryBuilder<'a> {
    page_url: &'a str,
    summary: PageSummary,
    open_image: Option<usize>,
    state: ScanState,
}

impl<'a> SummaryBuilder<'a> {
    fn new(page_url: &'a str) -> Self {
        SummaryBuilder {
            page_url,
            summary: PageSummary::default(),
            open_image: None,
            state: ScanState::Scanning,
        }
    }

    fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    fn process(&mut self, token: Token) -> Result<(), ExtractError> {
        let awaiting_title = self.state == ScanState::AwaitingTitle;
        self.state = ScanState::Scanning;

        match token {
            Token::Text(text) => {
                if awaiting_title {
                    assign(&mut self.summary.title, &text);
                }
            }
            Token::EndTag(name) => {
                if name == "head" {
                    self.state = ScanState::Done;
                }
            }
            Token::StartTag(tag) | Token::SelfClosingTag(tag) => self.apply_tag(&tag),
            Token::Error(TokenError::Eof) => self.state = ScanState::Done,
            Token::Error(err) => return Err(ExtractError::Parse(err)),
        }
        Ok(())
    }

    fn apply_tag(&mut self, tag: &Tag) {
        let property = tag.attr("property").unwrap_or_default();
        let name = tag.attr("name").unwrap_or_default();
        let content = tag.attr("content").unwrap_or_default();

        if tag.name == "title" && is_unset(&self.summary.title) {
            self.state = ScanState::AwaitingTitle;
        }

        match property {
            "og:title" => assign(&mut self.summary.title, content),
            "og:type" => assign(&mut self.summary.kind, content),
            "og:url" => assign(&mut self.summary.canonical_url, content),
            "og:site_name" => assign(&mut self.summary.site_name, content),
            "og:description" => assign(&mut self.summary.description, content),
            "og:image" | "og:image:url" => self.push_image(content),
            "og:image:secure_url" => {
                self.update_image(property, |img| assign(&mut img.secure_url, content))
            }
            "og:image:type" => {
                self.update_image(property, |img| assign(&mut img.mime_type, content))
            }
            "og:image:width" => {
                self.update_image(property, |img| img.width = parse_dimension(content))
            }
            "og:image:height" => {
                self.update_image(property, |img| img.height = parse_dimension(content))
            }
            "og:image:alt" => self.update_image(property, |img| assign(&mut img.alt, content)),
            _ => {}
        }

        match name {
            "description" if is_unset(&self.summary.description) => {
                assign(&mut self.summary.description, content)
            }
            "author" => assign(&mut self.summary.author, content),
            "keywords" => self.summary.keywords = Some(split_keywords(content)),
            _ => {}
        }

        if tag.name == "link" && tag.attr("rel") == Some("icon") {
            self.summary.icon = Some(self.icon_from(tag));
        }
    }

    fn push_image(&mut self, content: &str) {
        let url = resolve_link(content, self.page_url);
        self.summary.images.push(PreviewImage::new(url));
        self.open_image = Some(self.summary.images.len() - 1);
    }

    fn update_image(&mut self, property: &str, update: impl FnOnce(&mut PreviewImage)) {
        match self
            .open_image
            .and_then(|idx| self.summary.images.get_mut(idx))
        {
            Some(image) => update(image),
            None => trace!(property, "Ignoring image property with no preceding og:image"),
        }
    }

    fn icon_from(&self, tag: &Tag) -> PreviewImage {
        let url = tag
            .attr("href")
            .map(|href| resolve_link(href, self.page_url))
            .unwrap_or_default();

        let mut icon = PreviewImage::new(url);
        if let Some(mime_type) = tag.attr("type") {
            assign(&mut icon.mime_type, mime_type);
        }
        if let Some(sizes) = tag.attr("sizes") {
            let (width, height) = parse_sizes(sizes);
            icon.width = width;
            icon.height = height;
        }
        icon
    }

    fn finish(self) -> PageSummary {
        debug!(
            page_url = self.page_url,
            images = self.summary.images.len(),
            has_title = self.summary.title.is_some(),
            "Page summary extracted"
        );
        self.summary
    }
}

/// Empty values never count as set, so they are stored as `None`.
fn assign(field: &mut Option<String>, value: &str) {
    *field = (!value.is_empty()).then(|| value.to_string());
}

fn is_unset(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, str::is_empty)
}

fn split_keywords(content: &str) -> Vec<String> {
    content
        .split(',')
        .map(|keyword| keyword.trim().to_string())
        .collect()
}

/// Positive integer pixel dimension; anything else is unset.
fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().parse().ok().filter(|&n| n > 0)
}

/// Parse a `sizes` attribute of the form `WxH`. Only the first listed size is
/// used; `any` and malformed halves leave the dimension unset.
fn parse_sizes(sizes: &str) -> (Option<u32>, Option<u32>) {
    let first = sizes.split_whitespace().next().unwrap_or_default();
    if first.eq_ignore_ascii_case("any") {
        return (None, None);
    }

    let mut halves = first.splitn(2, |c: char| c == 'x' || c == 'X');
    let width = halves.next().and_then(parse_dimension);
    let height = halves.next().and_then(parse_dimension);
    (width, height)
}

/// Scan `tokens` from the document start through `</head>` (or end of input)
/// and build the page summary.
///
/// Tokens after `</head>` are never pulled from the iterator. A tokenizer
/// error other than end-of-stream fails the whole extraction and no partial
/// summary is returned.
pub fn extract_summary<I>(page_url: &str, tokens: I) -> Result<PageSummary, ExtractError>
where
    I: IntoIterator<Item = Token>,
{
    let mut builder = SummaryBuilder::new(page_url);
    for token in tokens {
        builder.process(token)?;
        if builder.is_done() {
            break;
        }
    }
    Ok(builder.finish())
}
