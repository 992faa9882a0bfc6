//! Rotating post content read from a spreadsheet exported as CSV.
//!
//! Column A holds either a message or a bare affiliate link, column B an
//! optional image or link. A file-backed cursor picks the next row on every
//! invocation.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use url::Url;

static URL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// One spreadsheet cell, classified once when the sheet is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Message(String),
    ImageRef(String),
    LinkRef(String),
    Empty,
}

impl Cell {
    pub fn classify(raw: &str) -> Self {
        let value = raw.trim();
        if value.is_empty() {
            return Self::Empty;
        }
        let single_token = !value.contains(char::is_whitespace);
        let is_http = value.starts_with("http://") || value.starts_with("https://");
        if !(single_token && is_http) {
            return Self::Message(value.to_string());
        }
        if looks_like_image(value) {
            Self::ImageRef(value.to_string())
        } else {
            Self::LinkRef(value.to_string())
        }
    }
}

fn looks_like_image(value: &str) -> bool {
    let path = Url::parse(value)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| value.to_ascii_lowercase());
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn first_url(text: &str) -> Option<String> {
    URL_IN_TEXT.find(text).map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledPost {
    /// Column A is a bare product link: scrape it and build the message.
    Promotion { affiliate_link: String },
    /// Column A is ready-made text.
    Announcement {
        message: String,
        image_url: Option<String>,
        link_url: Option<String>,
    },
}

impl ScheduledPost {
    pub fn from_cells(primary: &Cell, secondary: &Cell) -> Option<Self> {
        match primary {
            Cell::Empty => None,
            Cell::LinkRef(link) => Some(Self::Promotion {
                affiliate_link: link.clone(),
            }),
            Cell::ImageRef(image) => Some(Self::Announcement {
                message: image.clone(),
                image_url: Some(image.clone()),
                link_url: None,
            }),
            Cell::Message(text) => {
                let mut link_url = first_url(text);
                let mut image_url = None;
                match secondary {
                    Cell::ImageRef(image) => image_url = Some(image.clone()),
                    Cell::LinkRef(link) if link_url.is_none() => link_url = Some(link.clone()),
                    _ => {}
                }
                Some(Self::Announcement {
                    message: text.clone(),
                    image_url,
                    link_url,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedPost {
    /// Zero-based data row
    pub row: usize,
    pub total_rows: usize,
    pub post: ScheduledPost,
}

#[derive(Debug, Clone, Default)]
pub struct ContentSource {
    rows: Vec<(Cell, Cell)>,
}

impl ContentSource {
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|(a, b)| (Cell::classify(a.as_ref()), Cell::classify(b.as_ref())))
                .collect(),
        }
    }

    pub fn from_reader<R: Read>(reader: R, has_headers: bool) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record.context("Malformed row in content sheet")?;
            rows.push((
                Cell::classify(record.get(0).unwrap_or("")),
                Cell::classify(record.get(1).unwrap_or("")),
            ));
        }
        Ok(Self { rows })
    }

    pub fn from_csv_path(path: &Path, has_headers: bool) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open content sheet '{}'", path.display()))?;
        Self::from_reader(file, has_headers)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Takes the row under the cursor and advances it, skipping rows with
    /// nothing postable. Each row is looked at most once per call.
    pub fn next_post(&self, cursor: &RowCursor) -> Result<Option<SelectedPost>> {
        if self.rows.is_empty() {
            log::warn!("Content sheet is empty");
            return Ok(None);
        }

        let total = self.rows.len();
        let mut lease = cursor.lease()?;
        let mut index = lease.index() % total;

        for _ in 0..total {
            let (primary, secondary) = &self.rows[index];
            let row = index;
            index = (index + 1) % total;

            match ScheduledPost::from_cells(primary, secondary) {
                Some(post) => {
                    lease.commit(index)?;
                    log::info!("Selected row #{} of {}", row + 1, total);
                    return Ok(Some(SelectedPost {
                        row,
                        total_rows: total,
                        post,
                    }));
                }
                None => log::warn!("Row #{} has no usable content, skipping", row + 1),
            }
        }

        lease.commit(index)?;
        Ok(None)
    }
}

/// Persisted round-robin position.
#[derive(Debug, Clone)]
pub struct RowCursor {
    path: PathBuf,
}

impl RowCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the cursor file under an exclusive lock held until the lease drops.
    /// A missing or unreadable value counts as 0.
    pub fn lease(&self) -> Result<CursorLease> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open cursor file '{}'", self.path.display()))?;
        file.lock()
            .with_context(|| format!("Failed to lock cursor file '{}'", self.path.display()))?;

        let mut raw = String::new();
        let index = match file.read_to_string(&mut raw) {
            Ok(_) => raw.trim().parse::<usize>().unwrap_or_else(|_| {
                if !raw.trim().is_empty() {
                    log::warn!("Corrupt cursor value {:?}, starting over", raw.trim());
                }
                0
            }),
            Err(e) => {
                log::warn!("Unreadable cursor file, starting over: {e}");
                0
            }
        };

        Ok(CursorLease { file, index })
    }

    pub fn peek(&self) -> Result<usize> {
        Ok(self.lease()?.index())
    }
}

pub struct CursorLease {
    file: File,
    index: usize,
}

impl CursorLease {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn commit(&mut self, next: usize) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write!(self.file, "{next}")?;
        self.file.sync_all()?;
        self.index = next;
        Ok(())
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
