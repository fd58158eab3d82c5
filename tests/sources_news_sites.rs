// tests/sources_news_sites.rs
use cybernews_relay::article::DeliveryState;
use cybernews_relay::sources::news_sites::{extract_articles, SiteSpec, SITES};

const BLEEPING_HTML: &str = include_str!("fixtures/bleeping_front.html");

fn bleeping() -> SiteSpec {
    SITES
        .iter()
        .copied()
        .find(|s| s.name == "BleepingComputer")
        .expect("BleepingComputer stays in the site list")
}

#[test]
fn front_page_blocks_become_articles() {
    let articles = extract_articles(BLEEPING_HTML, &bleeping());

    // Third block is a deals stub with a too-short heading.
    assert_eq!(articles.len(), 2);
    assert_eq!(
        articles[0].title,
        "New stealer malware spreads via fake browser updates"
    );
    assert_eq!(articles[0].source_name, "BleepingComputer");
    assert_eq!(articles[0].state, DeliveryState::Pending);
    assert!(articles[0]
        .summary
        .as_deref()
        .unwrap()
        .starts_with("A previously undocumented information stealer"));

    // Relative href resolved against the site root.
    assert_eq!(
        articles[1].url,
        "https://www.bleepingcomputer.com/news/microsoft/exchange-servers-patched-against-ntlm-relay-attack/"
    );
}

#[test]
fn heading_beats_link_text_when_both_exist() {
    let site = SiteSpec {
        name: "SecurityWeek",
        url: "https://www.securityweek.com/",
        selector: "div.post",
    };
    let html = r#"
        <html><body>
          <div class="post">
            <a href="/supply-chain-attack-hits-ci-pipelines/">Read full story</a>
            <h2>Supply Chain Attack Hits Popular CI Pipelines</h2>
            <p>Build servers at several vendors executed a poisoned dependency.</p>
          </div>
        </body></html>
    "#;
    let articles = extract_articles(html, &site);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Supply Chain Attack Hits Popular CI Pipelines");
    assert_eq!(
        articles[0].url,
        "https://www.securityweek.com/supply-chain-attack-hits-ci-pipelines/"
    );
}

#[test]
fn page_without_matching_blocks_yields_nothing() {
    let html = "<html><body><div class=\"unrelated\">nothing here</div></body></html>";
    assert!(extract_articles(html, &bleeping()).is_empty());
}
