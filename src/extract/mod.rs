//! Field extraction helpers and the per-tick snapshot assembler
//!
//! Extractors never fail past their own boundary. A missing element or any
//! other read error is logged with the field name and intent, and the field
//! comes back as [`Field::Missing`].

use std::collections::HashMap;
use std::future::Future;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tracing::{debug, warn};

use crate::models::{EmojiComment, Field, SENTINEL};
use crate::traits::{ElementHandle, ElementQuery};

/// How a value is read off an element
#[derive(Debug, Clone, Copy)]
pub enum Read {
    Text,
    Attribute(&'static str),
    /// Text, or the attribute when the text is empty
    TextOr(&'static str),
}

/// Folds an extractor result into a field, logging why it is missing.
pub fn settle<T>(field: &'static str, intent: &'static str, result: Result<Option<T>>) -> Field<T> {
    match result {
        Ok(Some(value)) => Field::Found(value),
        Ok(None) => {
            warn!(field, intent, "element not found");
            Field::Missing
        }
        Err(e) => {
            warn!(field, intent, "extraction failed: {e:#}");
            Field::Missing
        }
    }
}

pub async fn read(page: &dyn ElementQuery, element: &ElementHandle, how: Read) -> Result<Option<String>> {
    match how {
        Read::Text => page.text(element).await.map(Some),
        Read::Attribute(name) => page.attribute(element, name).await,
        Read::TextOr(name) => {
            let text = page.text(element).await?;
            if text.is_empty() {
                page.attribute(element, name).await
            } else {
                Ok(Some(text))
            }
        }
    }
}

/// First match of `selector`, read with `how`
pub async fn first(page: &dyn ElementQuery, selector: &str, how: Read) -> Result<Option<String>> {
    let Some(element) = page.find(selector).await? else {
        return Ok(None);
    };
    read(page, &element, how)
        .await
        .with_context(|| format!("reading {selector}"))
}

/// First of several presentations of the same field that yields a value
pub async fn first_of(page: &dyn ElementQuery, candidates: &[(&str, Read)]) -> Result<Option<String>> {
    for (selector, how) in candidates {
        if let Some(value) = first(page, selector, *how).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// `index`-th match of `selector`
pub async fn nth(page: &dyn ElementQuery, selector: &str, index: usize, how: Read) -> Result<Option<String>> {
    if page.count(None, selector).await? <= index {
        return Ok(None);
    }
    read(page, &ElementHandle::root(selector, index), how)
        .await
        .with_context(|| format!("reading {selector}[{index}]"))
}

/// Every match of `selector`, in document order. No matches is an empty list,
/// an element without the wanted value becomes the sentinel.
pub async fn every(page: &dyn ElementQuery, selector: &str, how: Read) -> Result<Option<Vec<String>>> {
    let mut values = Vec::new();
    for element in page.find_all(selector).await? {
        let value = read(page, &element, how)
            .await
            .with_context(|| format!("reading {selector}"))?;
        values.push(value.unwrap_or_else(|| SENTINEL.to_string()));
    }
    Ok(Some(values))
}

/// One value per `container`, read from its first `child`. Containers without
/// the child get `fallback` so the list stays aligned with the containers. A
/// read that fails fails the whole list.
pub async fn per_item(
    page: &dyn ElementQuery,
    container: &str,
    child: &str,
    how: Read,
    fallback: &str,
) -> Result<Option<Vec<String>>> {
    let mut values = Vec::new();
    for (index, item) in page.find_all(container).await?.into_iter().enumerate() {
        let value = match page
            .find_in(&item, child)
            .await
            .with_context(|| format!("locating {child} in {container} #{index}"))?
        {
            Some(element) => read(page, &element, how)
                .await
                .with_context(|| format!("reading {child} in {container} #{index}"))?,
            None => None,
        };
        values.push(value.unwrap_or_else(|| fallback.to_string()));
    }
    Ok(Some(values))
}

/// Result of one field job, keyed by field name
pub enum FieldValue {
    Text(Field<String>),
    List(Field<Vec<String>>),
    Emoji(Field<Vec<EmojiComment>>),
}

pub type FieldJob<'a> = BoxFuture<'a, (&'static str, FieldValue)>;

pub fn text_job<'a>(name: &'static str, job: impl Future<Output = Field<String>> + Send + 'a) -> FieldJob<'a> {
    async move { (name, FieldValue::Text(job.await)) }.boxed()
}

pub fn list_job<'a>(
    name: &'static str,
    job: impl Future<Output = Field<Vec<String>>> + Send + 'a,
) -> FieldJob<'a> {
    async move { (name, FieldValue::List(job.await)) }.boxed()
}

pub fn emoji_job<'a>(
    name: &'static str,
    job: impl Future<Output = Field<Vec<EmojiComment>>> + Send + 'a,
) -> FieldJob<'a> {
    async move { (name, FieldValue::Emoji(job.await)) }.boxed()
}

/// Field results collected by name, independent of completion order.
#[derive(Default)]
pub struct FieldSet {
    values: HashMap<&'static str, FieldValue>,
}

impl FieldSet {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&mut self, name: &str) -> Field<String> {
        match self.values.remove(name) {
            Some(FieldValue::Text(field)) => field,
            _ => Field::Missing,
        }
    }

    pub fn list(&mut self, name: &str) -> Field<Vec<String>> {
        match self.values.remove(name) {
            Some(FieldValue::List(field)) => field,
            _ => Field::Missing,
        }
    }

    pub fn emoji(&mut self, name: &str) -> Field<Vec<EmojiComment>> {
        match self.values.remove(name) {
            Some(FieldValue::Emoji(field)) => field,
            _ => Field::Missing,
        }
    }
}

/// Runs a tick's field jobs with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotAssembler {
    concurrency: usize,
}

impl SnapshotAssembler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, jobs: Vec<FieldJob<'_>>) -> FieldSet {
        let total = jobs.len();
        let values: HashMap<_, _> = futures::stream::iter(jobs)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        debug!(fields = values.len(), total, "snapshot assembled");
        FieldSet { values }
    }
}
