use rewardledger::core::config::AppConfig;
use rewardledger::core::intake::RawRewardRequest;
use rewardledger::core::model::{Account, Currency, EntryType};
use rewardledger::core::posting::{PostingOutcome, verify_balance};
use rewardledger::core::store::LedgerStore;
use rewardledger::{App, AppCommand};
use rust_decimal::Decimal;
use std::fs;
use tempfile::TempDir;
use tracing::{error, info};

const USER: &str = "6f1c2a54-3b8e-4d2f-9a57-0c1e2d3f4a5b";

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(symbol: &str, price: f64) -> MockServer {
        let mock_server = MockServer::start().await;
        let url_path = format!("/v8/finance/chart/{symbol}");
        let mock_response = format!(
            r#"{{"chart": {{"result": [{{"meta": {{"regularMarketPrice": {price}, "currency": "INR"}}}}]}}}}"#
        );

        Mock::given(method("GET"))
            .and(path(&url_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn write_config(dir: &std::path::Path, yahoo_url: &str) -> std::path::PathBuf {
        let config_path = dir.join("config.yaml");
        let config_content = format!(
            r#"
users:
  - "{user}"
price_source: yahoo
providers:
  yahoo:
    base_url: "{yahoo_url}"
refresh:
  pacing_ms: 0
data_path: "{data}"
"#,
            user = super::USER,
            data = dir.join("data").display(),
        );
        std::fs::write(&config_path, config_content).expect("Failed to write config file");
        config_path
    }
}

fn request(quantity: &str, key: Option<&str>) -> RawRewardRequest {
    RawRewardRequest {
        user_id: Some(USER.to_string()),
        stock_symbol: Some("TCS.NS".to_string()),
        quantity: Some(serde_json::Value::String(quantity.to_string())),
        rewarded_at: Some("2024-06-20T10:00:00Z".to_string()),
        source: None,
        idempotency_key: key.map(str::to_string),
    }
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let mock_server = test_utils::create_mock_server("TCS.NS", 3500.0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = test_utils::write_config(temp_dir.path(), &mock_server.uri());
    let config_path = config_path.to_str().unwrap();

    for command in [
        AppCommand::Reward(request("2", Some("grant-1"))),
        AppCommand::Portfolio {
            user_id: USER.to_string(),
        },
        AppCommand::Today {
            user_id: USER.to_string(),
        },
        AppCommand::History {
            user_id: USER.to_string(),
        },
        AppCommand::Stats {
            user_id: USER.to_string(),
        },
        AppCommand::Refresh,
    ] {
        let result = rewardledger::run_command(command, Some(config_path)).await;
        assert!(
            result.is_ok(),
            "Command failed with: {:?}",
            result.err()
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_posting_persists_balanced_ledger() {
    let mock_server = test_utils::create_mock_server("TCS.NS", 3500.0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = test_utils::write_config(temp_dir.path(), &mock_server.uri());
    let config = AppConfig::load_from_path(&config_path).unwrap();
    let app = App::from_config(&config).unwrap();

    let outcome = app
        .posting
        .post_reward(request("2", Some("grant-1")))
        .await
        .unwrap();
    let PostingOutcome::Recorded { reward_id } = outcome else {
        panic!("expected a recorded reward, got {outcome:?}");
    };

    let entries = app.posting.ledger_for_reward(reward_id).await.unwrap();
    info!(?entries, "Posted ledger");
    assert_eq!(entries.len(), 6);
    assert!(verify_balance(&entries).is_ok());

    let cash = entries
        .iter()
        .find(|e| e.account == Account::Cash)
        .unwrap();
    assert_eq!(cash.entry_type, EntryType::Credit);
    assert_eq!(cash.currency, Currency::Inr);
    assert_eq!(cash.amount, Decimal::new(70483, 1));

    let holdings = app
        .valuation
        .portfolio(USER.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].value, Decimal::from(7000));

    app.execute(AppCommand::Ledger {
        reward_id: reward_id.to_string(),
    })
    .await
    .unwrap();
}

#[test_log::test(tokio::test)]
async fn test_replayed_key_records_once() {
    let mock_server = test_utils::create_mock_server("TCS.NS", 3500.0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = test_utils::write_config(temp_dir.path(), &mock_server.uri());
    let config = AppConfig::load_from_path(&config_path).unwrap();
    let app = App::from_config(&config).unwrap();

    let first = app
        .posting
        .post_reward(request("2", Some("grant-1")))
        .await
        .unwrap();
    let second = app
        .posting
        .post_reward(request("2", Some("grant-1")))
        .await
        .unwrap();

    assert_eq!(second, PostingOutcome::Duplicate {
        reward_id: first.reward_id()
    });
    let counts = app.store.row_counts().await.unwrap();
    assert_eq!(counts.rewards, 1);
    assert_eq!(counts.ledger_entries, 6);
    assert_eq!(counts.prices, 1);

    let report = app.refresher.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(app.store.row_counts().await.unwrap().prices, 2);
}

#[test_log::test(tokio::test)]
async fn test_rejected_reward_fails_command() {
    let mock_server = test_utils::create_mock_server("TCS.NS", 3500.0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = test_utils::write_config(temp_dir.path(), &mock_server.uri());

    let mut unknown_user = request("2", None);
    unknown_user.user_id = Some("0b7e9f1a-8c2d-4e3f-a1b2-c3d4e5f6a7b8".to_string());
    let result =
        rewardledger::run_command(AppCommand::Reward(unknown_user), config_path.to_str()).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("user_not_found"), "{err}");

    let result = rewardledger::run_command(
        AppCommand::Reward(request("-1", None)),
        config_path.to_str(),
    )
    .await;
    assert!(result.unwrap_err().to_string().contains("validation_error"));

    let result = rewardledger::run_command(
        AppCommand::Portfolio {
            user_id: "bob".to_string(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let missing = temp_dir.path().join("absent.yaml");
    let result = rewardledger::run_command(AppCommand::Refresh, missing.to_str()).await;
    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("Failed to read config file"));
    assert!(!fs::exists(temp_dir.path().join("data")).unwrap());
}

#[test_log::test(tokio::test)]
#[ignore = "hits the live Yahoo Finance API"]
async fn test_real_yahoo_finance_api() {
    use rewardledger::core::price::PriceFeed;
    use rewardledger::providers::yahoo_finance::YahooPriceFeed;

    let feed = YahooPriceFeed::new("https://query1.finance.yahoo.com").unwrap();
    let symbol = "TCS.NS";
    info!(?symbol, "Fetching price from Yahoo Finance");

    match feed.fetch_latest(symbol).await {
        Ok(Some(quote)) => {
            info!(?quote, "Received successful price response");
            assert!(quote.price > 0.0, "Price should be positive");
        }
        Ok(None) => panic!("No quote returned for {symbol}"),
        Err(e) => {
            error!("API request failed: {e}\n{e:?}");
            panic!("API request failed: {e}");
        }
    }
}
