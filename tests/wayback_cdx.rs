//! Scenario tests against a mock Wayback Machine, covering the search
//! iterator's pagination/dedup contract and the memento fetcher's
//! redirect-graph navigation.
//!
//! Mock-server technique grounded in the `mockito`/`#[tokio::test]`
//! style used by the `waybackmachine-client` example crate's own
//! `tests/archive.rs`.

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use mockito::Matcher;
use wayback::archive_url::{self, PlaybackMode};
use wayback::cancel::Cancellation;
use wayback::error::Error;
use wayback::memento::{get_memento, MementoOptions, MementoTarget};
use wayback::search::{search, MatchType, SearchParams};
use wayback::session::Session;

fn path_for(url: &str, ts: chrono::DateTime<Utc>, mode: &PlaybackMode) -> String {
    archive_url::format_with_base("", url, &ts, mode)
}

async fn mock_session(server: &mockito::ServerGuard) -> Session {
    Session::builder()
        .with_cdx_base_url(format!("{}/cdx/search/cdx", server.url()))
        .with_memento_base_url(format!("{}/web", server.url()))
        .with_rate_limits(1000.0, 1000.0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn search_pagination_follows_resume_key_and_dedups() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let page1 = "org,pagetest)/ 20100101000000 http://pagetest.org/ text/html 200 DIGEST000000000000000000000001 100\n\
                 org,pagetest)/ 20100102000000 http://pagetest.org/ text/html 200 DIGEST000000000000000000000002 100\n\
                 \n\
                 PAGE2KEY";
    let page2 = "org,pagetest)/ 20100102000000 http://pagetest.org/ text/html 200 DIGEST000000000000000000000002 100\n\
                 org,pagetest)/ 20100103000000 http://pagetest.org/ text/html 200 DIGEST000000000000000000000003 100";

    let mock_page1 = server
        .mock("GET", "/cdx/search/cdx")
        .match_query(Matcher::UrlEncoded("url".into(), "pagetest.org".into()))
        .with_status(200)
        .with_body(page1)
        .create_async()
        .await;

    let mock_page2 = server
        .mock("GET", "/cdx/search/cdx")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("url".into(), "pagetest.org".into()),
            Matcher::UrlEncoded("resumeKey".into(), "PAGE2KEY".into()),
        ]))
        .with_status(200)
        .with_body(page2)
        .create_async()
        .await;

    let params = SearchParams::new("pagetest.org").unwrap();
    let records: Vec<_> = search(&session, params, Cancellation::new())
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, Error>>()
        .unwrap();

    // Three distinct fingerprints total: the (timestamp, url, digest)
    // shared by page1's last row and page2's first row is deduplicated.
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].timestamp,
        Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(
        records[1].timestamp,
        Utc.with_ymd_and_hms(2010, 1, 2, 0, 0, 0).unwrap()
    );
    assert_eq!(
        records[2].timestamp,
        Utc.with_ymd_and_hms(2010, 1, 3, 0, 0, 0).unwrap()
    );

    mock_page1.assert_async().await;
    mock_page2.assert_async().await;
}

#[tokio::test]
async fn search_blocked_site_on_first_page_raises_before_any_record() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    server
        .mock("GET", "/cdx/search/cdx")
        .with_status(403)
        .with_body("AdministrativeAccessControlException: this content is blocked")
        .create_async()
        .await;

    let params = SearchParams::new("blocked.example").unwrap();
    let mut stream = Box::pin(search(&session, params, Cancellation::new()));

    match stream.next().await {
        Some(Err(Error::BlockedSite { .. })) => {}
        other => panic!("expected BlockedSite on the first page, got {:?}", other),
    }
}

#[tokio::test]
async fn search_blocked_site_on_later_page_terminates_cleanly() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let page1 = "org,later)/ 20100101000000 http://later.org/ text/html 200 DIGEST000000000000000000000009 100\n\
                 \n\
                 NEXTKEY";

    server
        .mock("GET", "/cdx/search/cdx")
        .match_query(Matcher::UrlEncoded("url".into(), "later.org".into()))
        .with_status(200)
        .with_body(page1)
        .create_async()
        .await;

    server
        .mock("GET", "/cdx/search/cdx")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("url".into(), "later.org".into()),
            Matcher::UrlEncoded("resumeKey".into(), "NEXTKEY".into()),
        ]))
        .with_status(403)
        .with_body("this content is blocked")
        .create_async()
        .await;

    let params = SearchParams::new("later.org").unwrap();
    let records: Vec<_> = search(&session, params, Cancellation::new())
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, Error>>()
        .unwrap();

    // Earlier records stand; the block on the later page ends the
    // stream cleanly rather than propagating an error.
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn search_sends_conjunctive_filter_parameters() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let mock = server
        .mock("GET", "/cdx/search/cdx")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("url".into(), "filtered.org".into()),
            Matcher::UrlEncoded("filter".into(), "statuscode:404".into()),
            Matcher::UrlEncoded("filter".into(), "urlkey:.*feature.*".into()),
        ]))
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let params = SearchParams::new("filtered.org")
        .unwrap()
        .with_match_type(MatchType::Prefix)
        .unwrap()
        .with_filter_field("statuscode:404")
        .with_filter_field("urlkey:.*feature.*");

    let records: Vec<_> = search(&session, params, Cancellation::new())
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, Error>>()
        .unwrap();

    assert!(records.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn memento_follows_archival_internal_redirect_under_exact_false() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let requested_ts = Utc.with_ymd_and_hms(2018, 8, 1, 0, 0, 0).unwrap();
    let landed_ts = Utc.with_ymd_and_hms(2018, 8, 1, 10, 0, 0).unwrap();
    let url = "http://www.noaa.gov/";

    let first_path = path_for(url, requested_ts, &PlaybackMode::Original);
    let second_path = path_for(url, landed_ts, &PlaybackMode::Original);
    let location = format!("{}/web{}", server.url(), second_path);

    server
        .mock("GET", &format!("/web{}", first_path)[..])
        .with_status(302)
        .with_header("location", &location)
        .with_body("")
        .create_async()
        .await;

    server
        .mock("GET", &format!("/web{}", second_path)[..])
        .with_status(200)
        .with_header("memento-datetime", "Wed, 01 Aug 2018 10:00:00 GMT")
        .with_header("x-archive-orig-content-type", "text/html")
        .with_body("hello noaa")
        .create_async()
        .await;

    let options = MementoOptions {
        mode: PlaybackMode::Original,
        exact: false,
        exact_redirects: None,
        target_window: std::time::Duration::from_secs(86_400),
        follow_redirects: true,
    };

    let memento = get_memento(
        &session,
        MementoTarget::Url {
            url: url.to_string(),
            timestamp: requested_ts,
        },
        &options,
        &Cancellation::new(),
    )
    .await
    .unwrap();

    assert_eq!(memento.url, url);
    assert_eq!(memento.timestamp, landed_ts);
    assert!(memento.memento_url.starts_with("https://web.archive.org/web/"));
    assert!(memento.history.is_empty());
    assert_eq!(memento.debug_history.len(), 2);
    assert_eq!(memento.text, "hello noaa");
}

#[tokio::test]
async fn memento_exact_true_rejects_divergent_archival_internal_redirect() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let requested_ts = Utc.with_ymd_and_hms(2018, 8, 1, 0, 0, 0).unwrap();
    let landed_ts = Utc.with_ymd_and_hms(2018, 8, 1, 10, 0, 0).unwrap();
    let url = "http://www.noaa.gov/";

    let first_path = path_for(url, requested_ts, &PlaybackMode::Original);
    let second_path = path_for(url, landed_ts, &PlaybackMode::Original);
    let location = format!("{}/web{}", server.url(), second_path);

    server
        .mock("GET", &format!("/web{}", first_path)[..])
        .with_status(302)
        .with_header("location", &location)
        .with_body("")
        .create_async()
        .await;

    let options = MementoOptions {
        mode: PlaybackMode::Original,
        exact: true,
        exact_redirects: None,
        target_window: std::time::Duration::from_secs(86_400),
        follow_redirects: true,
    };

    let result = get_memento(
        &session,
        MementoTarget::Url {
            url: url.to_string(),
            timestamp: requested_ts,
        },
        &options,
        &Cancellation::new(),
    )
    .await;

    assert!(matches!(result, Err(Error::MementoPlayback { .. })));
}

#[tokio::test]
async fn memento_historical_redirect_is_recorded_in_history() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let ts = Utc.with_ymd_and_hms(2015, 6, 1, 0, 0, 0).unwrap();
    let old_url = "http://example.com/old";
    let new_url = "http://example.com/new";

    let old_path = path_for(old_url, ts, &PlaybackMode::Original);
    let new_path = path_for(new_url, ts, &PlaybackMode::Original);
    let location = format!("{}/web{}", server.url(), new_path);

    server
        .mock("GET", &format!("/web{}", old_path)[..])
        .with_status(301)
        .with_header("location", &location)
        .with_header("memento-datetime", "Mon, 01 Jun 2015 00:00:00 GMT")
        .with_body("")
        .create_async()
        .await;

    server
        .mock("GET", &format!("/web{}", new_path)[..])
        .with_status(200)
        .with_header("memento-datetime", "Mon, 01 Jun 2015 00:00:00 GMT")
        .with_header("x-archive-orig-content-type", "text/html")
        .with_body("the new page")
        .create_async()
        .await;

    let options = MementoOptions::default();

    let memento = get_memento(
        &session,
        MementoTarget::Url {
            url: old_url.to_string(),
            timestamp: ts,
        },
        &options,
        &Cancellation::new(),
    )
    .await
    .unwrap();

    assert_eq!(memento.url, new_url);
    assert_ne!(memento.url, old_url);
    assert_eq!(memento.history.len(), 1);
    assert_eq!(memento.history[0].url, old_url);
    assert!(memento.history[0].is_redirect);
    assert_eq!(memento.history[0].status_code, 301);
}

#[tokio::test]
async fn memento_404_without_memento_signal_yields_no_memento_error() {
    let mut server = mockito::Server::new_async().await;
    let session = mock_session(&server).await;

    let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let url = "http://never-archived.example/";
    let path = path_for(url, ts, &PlaybackMode::Original);

    server
        .mock("GET", &format!("/web{}", path)[..])
        .with_status(404)
        .with_body("Hmm. We couldn't find that page in the Wayback Machine. Impatient?")
        .create_async()
        .await;

    let result = get_memento(
        &session,
        MementoTarget::Url {
            url: url.to_string(),
            timestamp: ts,
        },
        &MementoOptions::default(),
        &Cancellation::new(),
    )
    .await;

    assert!(matches!(result, Err(Error::NoMemento { .. })));
}

#[tokio::test]
async fn memento_rejects_when_session_is_closed() {
    let server = mockito::Server::new_async().await;
    let mut session = mock_session(&server).await;
    session.close();

    let result = get_memento(
        &session,
        MementoTarget::Url {
            url: "http://example.com/".to_string(),
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        },
        &MementoOptions::default(),
        &Cancellation::new(),
    )
    .await;

    assert!(matches!(result, Err(Error::SessionClosed)));
}
