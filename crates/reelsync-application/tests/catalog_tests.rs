// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use reelsync_application::{
    CatalogError, CatalogService, DownloadPlan, FilenameSynthesizer, Indexer, JobStatus,
    JobStatusError, JobStatusSource, StaticIndexer, StorageLayout,
};
use reelsync_domain::{
    DomainError, DownloadState, DownloadedAttributes, FallbackPolicy, MediaId, Source,
    SourcePreferences, SourceResolution, SourceType,
};
use reelsync_infrastructure::{InMemoryMediaRepository, InMemorySourceRepository};
use serde_json::{json, Value};

fn catalog() -> CatalogService {
    CatalogService::new(
        Arc::new(InMemorySourceRepository::new()),
        Arc::new(InMemoryMediaRepository::new()),
        FilenameSynthesizer::new(StorageLayout::new("/data", "audio", "video")),
        2,
    )
}

fn video_source() -> Source {
    Source::new(SourceType::YoutubeChannel, "chan", "Test Channel", "test-channel").with_preferences(
        SourcePreferences {
            resolution: SourceResolution::P1080,
            prefer_60fps: false,
            fallback: FallbackPolicy::NextBestHd,
            ..Default::default()
        },
    )
}

fn item(id: &str, title: &str, formats: Value) -> Value {
    json!({"id": id, "title": title, "upload_date": "20220110", "duration": 61, "formats": formats})
}

fn index_response() -> Value {
    json!({
        "entries": [
            item("exact1", "Exact Item", json!([
                {"format_id": "248", "height": 1080, "vcodec": "vp9", "acodec": "none", "fps": 30},
                {"format_id": "251", "vcodec": "none", "acodec": "opus", "abr": 130.0},
                {"format_id": "18", "height": 360, "vcodec": "avc1.42001E", "acodec": "mp4a.40.2"}
            ])),
            {"entries": [
                item("lowres", "Low Res Only", json!([
                    {"format_id": "18", "height": 360, "vcodec": "avc1", "acodec": "mp4a"}
                ])),
                null
            ]},
            {"title": "no key here"}
        ]
    })
}

struct FailingIndexer;

#[async_trait]
impl Indexer for FailingIndexer {
    async fn index(&self, _source: &Source) -> anyhow::Result<Value> {
        Err(anyhow!("upstream unavailable"))
    }
}

struct Jobs(Result<Option<JobStatus>, JobStatusError>);

impl JobStatusSource for Jobs {
    fn job_status(&self, _media_id: MediaId) -> Result<Option<JobStatus>, JobStatusError> {
        self.0.clone()
    }
}

async fn indexed() -> (CatalogService, Source) {
    let catalog = catalog();
    let source = catalog.add_source(video_source()).await.unwrap();
    catalog
        .index_source(source.id, &StaticIndexer::new(index_response()))
        .await
        .unwrap();
    (catalog, source)
}

async fn media_id(catalog: &CatalogService, source: &Source, key: &str) -> MediaId {
    catalog
        .list_media(source.id)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.key == key)
        .map(|m| m.id)
        .unwrap()
}

#[tokio::test]
async fn rejects_invalid_source() {
    let err = catalog()
        .add_source(Source::new(SourceType::YoutubeChannel, "", "Name", "dir"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidSource(msg) if msg.contains("key")));
}

#[tokio::test]
async fn indexing_creates_and_then_refreshes_media() {
    let catalog = catalog();
    let source = catalog.add_source(video_source()).await.unwrap();
    let indexer = StaticIndexer::new(index_response());

    let first = catalog.index_source(source.id, &indexer).await.unwrap();
    assert_eq!(first.discovered, 3);
    assert_eq!(first.created, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.downloadable, 1);
    assert_eq!(catalog.events().count_named("media.created"), 2);

    let second = catalog.index_source(source.id, &indexer).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.refreshed, 2);
    assert_eq!(catalog.events().count_named("media.created"), 2);

    let media = catalog.list_media(source.id).await.unwrap();
    let lowres = media.iter().find(|m| m.key == "lowres").unwrap();
    assert!(!lowres.can_download);
    assert!(lowres.published.is_some());
}

#[tokio::test]
async fn indexing_failure_flags_source() {
    let catalog = catalog();
    let source = catalog.add_source(video_source()).await.unwrap();
    let err = catalog
        .index_source(source.id, &FailingIndexer)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Indexing(id, _) if id == source.id));

    let summary = catalog
        .index_source(source.id, &StaticIndexer::new(json!({"entries": []})))
        .await
        .unwrap();
    assert_eq!(summary.discovered, 0);
}

#[tokio::test]
async fn plans_exact_pair_download() {
    let (catalog, source) = indexed().await;
    let id = media_id(&catalog, &source, "exact1").await;

    let plan = catalog.plan_download(id).await.unwrap();
    let DownloadPlan::Ready(request) = plan else {
        panic!("expected a ready plan");
    };
    assert_eq!(request.format_string, "248+251");
    assert!(request.matched_exactly);
    assert_eq!(request.extension, "mkv");
    assert_eq!(request.url, "https://www.youtube.com/watch?v=exact1");
    assert_eq!(
        request.file_path.to_str().unwrap(),
        "/data/video/test-channel/2022-01-10_test-channel_exact-item_exact1_1080p-vp9-opus.mkv"
    );
}

#[tokio::test]
async fn sub_hd_only_media_is_undownloadable() {
    let (catalog, source) = indexed().await;
    let id = media_id(&catalog, &source, "lowres").await;
    assert_eq!(
        catalog.plan_download(id).await.unwrap(),
        DownloadPlan::Undownloadable
    );
}

#[tokio::test]
async fn concurrent_plans_for_same_media_agree() {
    let (catalog, source) = indexed().await;
    let id = media_id(&catalog, &source, "exact1").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.plan_download(id).await.unwrap() })
        })
        .collect();
    let mut plans = Vec::new();
    for handle in handles {
        plans.push(handle.await.unwrap());
    }
    assert!(plans.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn download_is_recorded_once() {
    let (catalog, source) = indexed().await;
    let id = media_id(&catalog, &source, "exact1").await;
    let attrs = DownloadedAttributes {
        audio_codec: Some("opus".into()),
        video_codec: Some("vp9".into()),
        container: Some("mkv".into()),
        fps: Some(30),
        hdr: false,
        filesize: Some(42),
    };

    let media = catalog.record_download(id, attrs.clone()).await.unwrap();
    assert!(media.downloaded);
    assert_eq!(catalog.events().count_named("media.downloaded"), 1);

    let err = catalog.record_download(id, attrs).await.unwrap_err();
    assert!(matches!(err, CatalogError::Domain(DomainError::AlreadyDownloaded(_))));
    let err = catalog.plan_download(id).await.unwrap_err();
    assert!(matches!(err, CatalogError::Domain(DomainError::AlreadyDownloaded(_))));
}

#[tokio::test]
async fn download_state_follows_job_status() {
    let (catalog, source) = indexed().await;
    let id = media_id(&catalog, &source, "exact1").await;

    let running = Jobs(Ok(Some(JobStatus {
        is_running: true,
        has_error: false,
    })));
    assert_eq!(
        catalog.download_state(id, &running).await.unwrap(),
        DownloadState::Downloading
    );
    let offline = Jobs(Err(JobStatusError::Unavailable("offline".into())));
    assert_eq!(
        catalog.download_state(id, &offline).await.unwrap(),
        DownloadState::Unknown
    );

    catalog
        .record_download(id, DownloadedAttributes::default())
        .await
        .unwrap();
    assert_eq!(
        catalog.download_state(id, &running).await.unwrap(),
        DownloadState::Downloaded
    );
}

#[tokio::test]
async fn deleting_source_cascades_to_media() {
    let (catalog, source) = indexed().await;
    assert_eq!(catalog.delete_source(source.id).await.unwrap(), 2);
    assert!(catalog.list_media(source.id).await.unwrap().is_empty());
    assert_eq!(catalog.events().count_named("source.deleted"), 1);
    assert!(matches!(
        catalog.delete_source(source.id).await,
        Err(CatalogError::SourceNotFound(_))
    ));
}
