//! Provider payloads mapped onto [`MetadataItem`] / [`MetadataDetail`].
//!
//! Each listing endpoint names poster, rating and year differently. Missing
//! optional fields become empty strings.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::metadata::{
    CalendarDay, MediaKind, MetadataDetail, MetadataItem, MetadataResult,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Picture {
    large: Option<String>,
    normal: Option<String>,
}

impl Picture {
    fn poster(self) -> String {
        self.normal
            .filter(|url| !url.is_empty())
            .or(self.large)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rating {
    value: Option<f64>,
}

/// One decimal place; an absent or zero rating is empty.
fn format_rating(rating: Option<Rating>) -> String {
    match rating.and_then(|rating| rating.value) {
        Some(value) if value != 0.0 => format!("{value:.1}"),
        _ => String::new(),
    }
}

/// First run of four ASCII digits, e.g. the year inside `"2023 / 美国 / 剧情"`.
pub(crate) fn extract_year(subtitle: &str) -> String {
    subtitle
        .as_bytes()
        .windows(4)
        .position(|window| window.iter().all(u8::is_ascii_digit))
        .map(|start| subtitle[start..start + 4].to_string())
        .unwrap_or_default()
}

/// Upstream ids are usually strings but occasionally numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => id,
        Value::Number(id) => id.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize)]
struct CategoryItem {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    card_subtitle: Option<String>,
    #[serde(default)]
    pic: Option<Picture>,
    #[serde(default)]
    rating: Option<Rating>,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    #[serde(default)]
    items: Vec<CategoryItem>,
}

pub fn categories(payload: Value) -> Result<MetadataResult, serde_json::Error> {
    let payload: CategoryPayload = serde_json::from_value(payload)?;
    let list = payload
        .items
        .into_iter()
        .map(|item| MetadataItem {
            id: item.id,
            title: item.title,
            poster: item.pic.map(Picture::poster).unwrap_or_default(),
            rate: format_rating(item.rating),
            year: item.card_subtitle.as_deref().map(extract_year).unwrap_or_default(),
        })
        .collect();
    Ok(MetadataResult::success(list))
}

#[derive(Debug, Deserialize)]
struct TagListItem {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    rate: Option<String>,
    #[serde(default)]
    card_subtitle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagListPayload {
    #[serde(default)]
    subjects: Vec<TagListItem>,
}

pub fn tag_list(payload: Value) -> Result<MetadataResult, serde_json::Error> {
    let payload: TagListPayload = serde_json::from_value(payload)?;
    let list = payload
        .subjects
        .into_iter()
        .map(|item| MetadataItem {
            id: item.id,
            title: item.title,
            poster: item.cover.unwrap_or_default(),
            rate: item.rate.unwrap_or_default(),
            year: item.card_subtitle.as_deref().map(extract_year).unwrap_or_default(),
        })
        .collect();
    Ok(MetadataResult::success(list))
}

#[derive(Debug, Deserialize)]
struct RecommendItem {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    pic: Option<Picture>,
    #[serde(default)]
    rating: Option<Rating>,
}

#[derive(Debug, Deserialize)]
struct RecommendPayload {
    #[serde(default)]
    items: Vec<RecommendItem>,
}

/// Keeps only movie and tv entries; the feed also carries ads and collections.
pub fn recommendations(payload: Value) -> Result<MetadataResult, serde_json::Error> {
    let payload: RecommendPayload = serde_json::from_value(payload)?;
    let list = payload
        .items
        .into_iter()
        .filter(|item| {
            item.kind
                .as_deref()
                .is_some_and(|kind| kind.parse::<MediaKind>().is_ok())
        })
        .map(|item| MetadataItem {
            id: item.id,
            title: item.title,
            poster: item.pic.map(Picture::poster).unwrap_or_default(),
            rate: format_rating(item.rating),
            year: item.year.unwrap_or_default(),
        })
        .collect();
    Ok(MetadataResult::success(list))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Person {
    name: String,
}

fn names(people: Vec<Person>) -> Vec<String> {
    people
        .into_iter()
        .map(|person| person.name)
        .filter(|name| !name.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct DetailPayload {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    pic: Option<Picture>,
    #[serde(default)]
    rating: Option<Rating>,
    #[serde(default)]
    directors: Vec<Person>,
    #[serde(default)]
    writers: Vec<Person>,
    #[serde(default)]
    actors: Vec<Person>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    countries: Vec<String>,
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    episodes_count: Option<u32>,
    #[serde(default)]
    durations: Vec<String>,
    #[serde(default)]
    pubdate: Vec<String>,
    #[serde(default)]
    intro: Option<String>,
}

/// Leading integer of a duration label such as `"45分钟"`.
fn leading_minutes(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

pub fn detail(payload: Value) -> Result<MetadataDetail, serde_json::Error> {
    let payload: DetailPayload = serde_json::from_value(payload)?;
    Ok(MetadataDetail {
        id: payload.id,
        title: payload.title,
        poster: payload.pic.map(Picture::poster).unwrap_or_default(),
        rate: format_rating(payload.rating),
        year: payload.year.unwrap_or_default(),
        directors: names(payload.directors),
        screenwriters: names(payload.writers),
        cast: names(payload.actors),
        genres: payload.genres,
        countries: payload.countries,
        languages: payload.languages,
        episodes: payload.episodes_count.filter(|count| *count > 0),
        episode_length: payload
            .durations
            .first()
            .and_then(|label| leading_minutes(label)),
        first_aired: payload.pubdate.into_iter().next().unwrap_or_default(),
        plot_summary: payload.intro.unwrap_or_default(),
    })
}

/// Drops calendar entries without artwork.
pub fn calendar(payload: Value) -> Result<Vec<CalendarDay>, serde_json::Error> {
    let mut days: Vec<CalendarDay> = serde_json::from_value(payload)?;
    for day in &mut days {
        day.items.retain(|item| item.images.is_some());
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_first_four_digit_run() {
        assert_eq!(extract_year("2023 / 美国 / 剧情"), "2023");
        assert_eq!(extract_year("美国 / 1999"), "1999");
        assert_eq!(extract_year("第12集"), "");
        assert_eq!(extract_year(""), "");
    }

    #[test]
    fn category_shape_prefers_normal_picture() {
        let result = categories(json!({
            "total": 1,
            "items": [{
                "id": "35",
                "title": "Test",
                "card_subtitle": "2021 / 中国大陆",
                "pic": {"large": "https://img1.doubanio.com/l.jpg", "normal": "https://img1.doubanio.com/n.jpg"},
                "rating": {"value": 7.26}
            }]
        }))
        .unwrap();
        assert!(result.is_success());
        assert_eq!(
            result.list[0],
            MetadataItem {
                id: "35".into(),
                title: "Test".into(),
                poster: "https://img1.doubanio.com/n.jpg".into(),
                rate: "7.3".into(),
                year: "2021".into(),
            }
        );
    }

    #[test]
    fn missing_optional_fields_become_empty() {
        let expected = MetadataItem {
            id: "1".into(),
            title: "Bare".into(),
            ..MetadataItem::default()
        };

        let category = categories(json!({"items": [{"id": "1", "title": "Bare"}]})).unwrap();
        assert_eq!(category.list, vec![expected.clone()]);

        let list = tag_list(json!({"subjects": [{"id": "1", "title": "Bare"}]})).unwrap();
        assert_eq!(list.list, vec![expected.clone()]);

        let recommend =
            recommendations(json!({"items": [{"id": 1, "title": "Bare", "type": "tv"}]})).unwrap();
        assert_eq!(recommend.list, vec![expected]);
    }

    #[test]
    fn zero_rating_is_empty() {
        let result = categories(json!({
            "items": [{"id": "1", "title": "x", "rating": {"value": 0}}]
        }))
        .unwrap();
        assert_eq!(result.list[0].rate, "");
    }

    #[test]
    fn recommendation_feed_keeps_movies_and_tv_only() {
        let result = recommendations(json!({
            "items": [
                {"id": "1", "title": "m", "type": "movie", "year": "2020"},
                {"id": "2", "title": "ad", "type": "ad"},
                {"id": "3", "title": "t", "type": "tv"},
                {"id": "4", "title": "untyped"}
            ]
        }))
        .unwrap();
        let ids: Vec<_> = result.list.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(result.list[0].year, "2020");
    }

    #[test]
    fn detail_collects_people_and_durations() {
        let detail = detail(json!({
            "id": "26",
            "title": "Show",
            "year": "2019",
            "pic": {"large": "https://img2.doubanio.com/l.jpg"},
            "directors": [{"name": "A"}],
            "writers": [{"name": "B"}],
            "actors": [{"name": "C"}, {"name": ""}],
            "genres": ["剧情"],
            "episodes_count": 12,
            "durations": ["45分钟"],
            "pubdate": ["2019-05-01(中国大陆)"],
            "intro": "plot"
        }))
        .unwrap();
        assert_eq!(detail.poster, "https://img2.doubanio.com/l.jpg");
        assert_eq!(detail.directors, vec!["A"]);
        assert_eq!(detail.screenwriters, vec!["B"]);
        assert_eq!(detail.cast, vec!["C"]);
        assert_eq!(detail.episodes, Some(12));
        assert_eq!(detail.episode_length, Some(45));
        assert_eq!(detail.first_aired, "2019-05-01(中国大陆)");
        assert_eq!(detail.rate, "");
    }

    #[test]
    fn calendar_drops_items_without_images() {
        let days = calendar(json!([{
            "weekday": {"en": "Mon", "cn": "星期一", "id": 1},
            "items": [
                {"id": 1, "name": "a", "images": {"large": "l"}},
                {"id": 2, "name": "b", "images": null}
            ]
        }]))
        .unwrap();
        assert_eq!(days[0].items.len(), 1);
        assert_eq!(days[0].items[0].id, 1);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(categories(json!({"items": "nope"})).is_err());
    }
}
