//! Page records → [`Post`], database record → [`Database`], and listing helpers.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use blockfeed_shared::{Database, DimensionProbe, FileObject, Post, SelectProperty};

use crate::raw::{RawDatabase, RawFile, RawPage, RawRichText};

/// Slug of the profile page, listed nowhere but reachable by slug.
pub const PROFILE_SLUG: &str = "profile";

// ---------------------------------------------------------------------------
// Property shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TitleProp {
    #[serde(default)]
    title: Vec<RawRichText>,
}

#[derive(Debug, Default, Deserialize)]
struct RichTextProp {
    #[serde(default)]
    rich_text: Vec<RawRichText>,
}

impl RichTextProp {
    fn first(&self) -> Option<&str> {
        self.rich_text
            .first()
            .map(|rt| rt.plain_text.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct DateValue {
    #[serde(default)]
    start: String,
}

#[derive(Debug, Default, Deserialize)]
struct DateProp {
    #[serde(default)]
    date: Option<DateValue>,
}

#[derive(Debug, Default, Deserialize)]
struct LastEditedProp {
    #[serde(default)]
    last_edited_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MultiSelectProp {
    #[serde(default)]
    multi_select: Vec<SelectProperty>,
}

#[derive(Debug, Default, Deserialize)]
struct FilesProp {
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Debug, Default, Deserialize)]
struct NumberProp {
    #[serde(default)]
    number: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct UrlProp {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelationRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RelationProp {
    #[serde(default)]
    relation: Vec<RelationRef>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckboxProp {
    #[serde(default)]
    checkbox: bool,
}

/// The page properties this crate reads; any other property is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PostProperties {
    page: TitleProp,
    slug: RichTextProp,
    date: DateProp,
    update_date: LastEditedProp,
    tags: MultiSelectProp,
    excerpt: RichTextProp,
    meta_description: RichTextProp,
    featured_image: FilesProp,
    rank: NumberProp,
    external_link: UrlProp,
    social_share_hashtags: RichTextProp,
    related_posts: RelationProp,
    internal_tags: MultiSelectProp,
    published: CheckboxProp,
}

impl PostProperties {
    fn read(raw: &RawPage) -> Option<Self> {
        match Self::deserialize(Value::Object(raw.properties.clone())) {
            Ok(props) => Some(props),
            Err(e) => {
                warn!(page_id = %raw.id, error = %e, "unreadable page properties");
                None
            }
        }
    }

    fn title(&self) -> Option<&str> {
        self.page
            .title
            .first()
            .map(|rt| rt.plain_text.as_str())
            .filter(|s| !s.is_empty())
    }

    fn date(&self) -> Option<&str> {
        self.date.date.as_ref().map(|d| d.start.as_str())
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// A page is kept only with a non-empty title, a non-empty slug, and a date.
pub fn is_valid_page(raw: &RawPage) -> bool {
    PostProperties::read(raw).is_some_and(|p| {
        !p.page.title.is_empty() && !p.slug.rich_text.is_empty() && p.date.date.is_some()
    })
}

/// The page's full slug text, used for naming its icon asset.
pub fn page_slug(raw: &RawPage) -> Option<String> {
    let props = PostProperties::read(raw)?;
    let slug: String = props
        .slug
        .rich_text
        .iter()
        .map(|rt| rt.plain_text.as_str())
        .collect();
    (!slug.is_empty()).then_some(slug)
}

/// Build a [`Post`]. Cover and featured image dimensions come from `probe`.
pub async fn build_post<P: DimensionProbe>(raw: &RawPage, probe: &P) -> Post {
    let props = PostProperties::read(raw).unwrap_or_default();

    let title = props.title().unwrap_or_default().to_string();
    let date = props.date().unwrap_or_default().to_string();

    let cover = match raw.cover.as_ref().and_then(RawFile::to_file_object) {
        Some(file) => Some(probed(file, probe).await),
        None => None,
    };
    let featured_image = match props
        .featured_image
        .files
        .first()
        .and_then(RawFile::to_file_object)
    {
        Some(file) => Some(probed(file, probe).await),
        None => None,
    };

    Post {
        page_id: raw.id.clone(),
        icon: raw.icon.as_ref().and_then(RawFile::to_icon),
        cover,
        slug: props.slug.first().unwrap_or_default().to_string(),
        update_date: props
            .update_date
            .last_edited_time
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| date.clone()),
        date,
        tags: props.tags.multi_select,
        excerpt: props
            .excerpt
            .first()
            .map_or_else(|| title.clone(), str::to_string),
        meta_description: props.meta_description.first().unwrap_or_default().to_string(),
        featured_image,
        rank: props.rank.number.map_or(0, |n| n as i64),
        last_edited_date: raw.last_edited_time.clone(),
        external_link: props.external_link.url.filter(|u| !u.is_empty()),
        social_share_hashtags: props.social_share_hashtags.first().map(str::to_string),
        related_post_page_ids: props.related_posts.relation.into_iter().map(|r| r.id).collect(),
        internal_tags: props.internal_tags.multi_select,
        published: props.published.checkbox,
        title,
    }
}

async fn probed<P: DimensionProbe>(file: FileObject, probe: &P) -> FileObject {
    let dims = probe.dimensions(&file.url).await;
    file.with_dimensions(dims)
}

/// Build the [`Database`] record.
pub fn build_database(raw: &RawDatabase) -> Database {
    let join = |runs: &[RawRichText]| -> String { runs.iter().map(|rt| rt.plain_text.as_str()).collect() };
    Database {
        title: join(&raw.title),
        description: join(&raw.description),
        icon: raw.icon.as_ref().and_then(RawFile::to_icon),
        cover: raw.cover.as_ref().and_then(RawFile::to_file_object),
    }
}

// ---------------------------------------------------------------------------
// Listing helpers
// ---------------------------------------------------------------------------

/// Every post except the profile page, in query order (date descending).
pub fn blog_posts(posts: &[Post]) -> Vec<&Post> {
    posts.iter().filter(|p| p.slug != PROFILE_SLUG).collect()
}

/// The `limit` most recent blog posts.
pub fn recent(posts: &[Post], limit: usize) -> Vec<&Post> {
    blog_posts(posts).into_iter().take(limit).collect()
}

/// Blog posts with a positive rank, highest first. Equal ranks keep query order.
pub fn ranked(posts: &[Post], limit: usize) -> Vec<&Post> {
    let mut ranked: Vec<&Post> = blog_posts(posts).into_iter().filter(|p| p.rank > 0).collect();
    ranked.sort_by(|a, b| b.rank.cmp(&a.rank));
    ranked.truncate(limit);
    ranked
}

pub fn by_slug<'a>(posts: &'a [Post], slug: &str) -> Option<&'a Post> {
    posts.iter().find(|p| p.slug == slug)
}

pub fn by_page_id<'a>(posts: &'a [Post], page_id: &str) -> Option<&'a Post> {
    posts.iter().find(|p| p.page_id == page_id)
}

fn tagged<'a>(posts: &'a [Post], tag: &str) -> Vec<&'a Post> {
    if tag.is_empty() {
        return Vec::new();
    }
    blog_posts(posts)
        .into_iter()
        .filter(|p| p.tags.iter().any(|t| t.name == tag))
        .collect()
}

/// The first `limit` blog posts carrying `tag`.
pub fn by_tag<'a>(posts: &'a [Post], tag: &str, limit: usize) -> Vec<&'a Post> {
    let mut posts = tagged(posts, tag);
    posts.truncate(limit);
    posts
}

fn page_slice<T>(items: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    if page < 1 || per_page == 0 {
        return Vec::new();
    }
    items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect()
}

/// 1-based page of blog posts; page 0 is empty.
pub fn page_of(posts: &[Post], page: usize, per_page: usize) -> Vec<&Post> {
    page_slice(blog_posts(posts), page, per_page)
}

/// 1-based page of blog posts carrying `tag`.
pub fn page_of_tag<'a>(posts: &'a [Post], tag: &str, page: usize, per_page: usize) -> Vec<&'a Post> {
    page_slice(tagged(posts, tag), page, per_page)
}

pub fn page_count(posts: &[Post], per_page: usize) -> usize {
    blog_posts(posts).len().div_ceil(per_page.max(1))
}

pub fn page_count_by_tag(posts: &[Post], tag: &str, per_page: usize) -> usize {
    tagged(posts, tag).len().div_ceil(per_page.max(1))
}

/// Every tag used by any post, first occurrence per name, sorted by name.
pub fn all_tags(posts: &[Post]) -> Vec<SelectProperty> {
    let mut tags: Vec<SelectProperty> = Vec::new();
    for tag in posts.iter().flat_map(|p| &p.tags) {
        if !tags.iter().any(|t| t.name == tag.name) {
            tags.push(tag.clone());
        }
    }
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    tags
}
