use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Login credentials for a financial institution.
#[derive(Clone, Default, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "is_unset")]
    pub pin: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Modifiers for `POST /connect`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectOptions {
    #[serde(skip_serializing_if = "is_unset")]
    pub webhook: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub pending: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub login_only: bool,
    /// Ask for the list of MFA delivery methods instead of sending a code.
    #[serde(skip_serializing_if = "is_false")]
    pub list: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// Filters for `POST /connect/get`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectGetOptions {
    #[serde(skip_serializing_if = "is_false")]
    pub pending: bool,
    #[serde(skip_serializing_if = "is_unset")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<NaiveDate>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_unset(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(str::is_empty)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct Auth<'a> {
    pub client_id: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddUserRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    #[serde(rename = "type")]
    pub institution_type: &'a str,
    #[serde(flatten)]
    pub credentials: &'a Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'a ConnectOptions>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StepSendMethodRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    pub access_token: &'a str,
    pub options: SendMethodOptions<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMethodOptions<'a> {
    pub send_method: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StepRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    pub access_token: &'a str,
    pub mfa: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    pub access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'a ConnectGetOptions>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    #[serde(flatten)]
    pub credentials: &'a Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa: Option<&'a str>,
    pub access_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteRequest<'a> {
    #[serde(flatten)]
    pub auth: Auth<'a>,
    pub access_token: &'a str,
}

/// Result of a Connect call: either linked data or a pending MFA challenge.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connected(ConnectResponse),
    MfaRequired(MfaResponse),
}

impl ConnectOutcome {
    pub fn access_token(&self) -> &str {
        match self {
            ConnectOutcome::Connected(r) => &r.access_token,
            ConnectOutcome::MfaRequired(r) => &r.access_token,
        }
    }

    pub fn is_mfa_required(&self) -> bool {
        matches!(self, ConnectOutcome::MfaRequired(_))
    }

    pub fn connected(self) -> Option<ConnectResponse> {
        match self {
            ConnectOutcome::Connected(r) => Some(r),
            ConnectOutcome::MfaRequired(_) => None,
        }
    }

    pub fn mfa(self) -> Option<MfaResponse> {
        match self {
            ConnectOutcome::MfaRequired(r) => Some(r),
            ConnectOutcome::Connected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectResponse {
    pub access_token: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct MfaResponse {
    pub access_token: String,
    pub challenge: MfaChallenge,
}

/// Challenge issued by the institution, keyed on the response `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "mfa", rename_all = "lowercase")]
pub enum MfaChallenge {
    Questions(Vec<MfaQuestion>),
    List(Vec<MfaSendMethod>),
    Device(MfaDevice),
    Selections(Vec<MfaSelection>),
    /// A challenge type this crate does not model; the raw `mfa` payload is kept.
    #[serde(skip_deserializing)]
    Other { kind: String, mfa: Value },
}

const KNOWN_CHALLENGES: [&str; 4] = ["questions", "list", "device", "selections"];

impl MfaChallenge {
    pub fn kind(&self) -> &str {
        match self {
            MfaChallenge::Questions(_) => "questions",
            MfaChallenge::List(_) => "list",
            MfaChallenge::Device(_) => "device",
            MfaChallenge::Selections(_) => "selections",
            MfaChallenge::Other { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MfaQuestion {
    pub question: String,
}

/// A delivery channel for a one-time code, e.g. `{"mask": "xxx-xxx-5309", "type": "phone"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MfaSendMethod {
    pub mask: String,
    #[serde(rename = "type")]
    pub method_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MfaDevice {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MfaSelection {
    pub question: String,
    #[serde(default)]
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_item")]
    pub item: Option<String>,
    #[serde(rename = "_user")]
    pub user: Option<String>,
    #[serde(default)]
    pub balance: Balance,
    pub institution_type: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub meta: Option<AccountMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Balance {
    pub available: Option<Decimal>,
    pub current: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountMeta {
    pub name: Option<String>,
    pub number: Option<String>,
    pub limit: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_account")]
    pub account_id: String,
    #[serde(rename = "_pendingTransaction")]
    pub pending_transaction: Option<String>,
    pub amount: Decimal,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    pub name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    pub category: Option<Vec<String>>,
    pub category_id: Option<String>,
    pub meta: Option<TransactionMeta>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMeta {
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionType {
    pub primary: Option<String>,
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| D::Error::custom("invalid date value"))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(0..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[derive(Deserialize)]
struct TokenOnly {
    access_token: String,
}

#[derive(Deserialize)]
struct RawChallenge {
    #[serde(rename = "type")]
    kind: String,
    mfa: Value,
}

fn parse_challenge(value: &Value) -> Result<MfaChallenge, serde_json::Error> {
    let raw = RawChallenge::deserialize(value)?;
    if KNOWN_CHALLENGES.contains(&raw.kind.as_str()) {
        return MfaChallenge::deserialize(value);
    }
    Ok(MfaChallenge::Other {
        kind: raw.kind,
        mfa: raw.mfa,
    })
}

/// Decode a successful Connect body. A body carrying `mfa` is a challenge.
pub(crate) fn parse_outcome(data: &str) -> Result<ConnectOutcome, serde_json::Error> {
    let value: Value = serde_json::from_str(data)?;
    if value.get("mfa").is_some() {
        let TokenOnly { access_token } = TokenOnly::deserialize(&value)?;
        let challenge = parse_challenge(&value)?;
        debug!("Parsed MFA challenge of type {}", challenge.kind());
        return Ok(ConnectOutcome::MfaRequired(MfaResponse {
            access_token,
            challenge,
        }));
    }
    let response = ConnectResponse::deserialize(&value)?;
    debug!(
        "Parsed {} accounts and {} transactions",
        response.accounts.len(),
        response.transactions.len()
    );
    Ok(ConnectOutcome::Connected(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    const AUTH: Auth<'static> = Auth {
        client_id: "test_id",
        secret: "test_secret",
    };

    fn connected_payload() -> String {
        json!({
            "access_token": "test_chase",
            "accounts": [
                {
                    "_id": "QPO8Jo8vdDHMepg41PBwckXm4KdK1yUdmXOwK",
                    "_item": "KdDjmojBERUKx3JkDd9RuxA5EvejA4SENO4AA",
                    "_user": "eJXpMzpR65FP4RYno6rzuA7OZjd9n3Hna0RYa",
                    "balance": { "available": 1203.42, "current": 1274.93 },
                    "institution_type": "fake_institution",
                    "meta": { "name": "Plaid Savings", "number": "9606" },
                    "subtype": "savings",
                    "type": "depository"
                }
            ],
            "transactions": [
                {
                    "_account": "XARE85EJqKsjxLp6XR8ocg8VakrkXpTXmRdOo",
                    "_id": "0AZ0De04KqsreDgVwM1RSRYjyd8yXxSDQ8Zxn",
                    "amount": 200,
                    "date": "2014-07-21",
                    "name": "ATM Withdrawal",
                    "meta": {
                        "location": {
                            "city": "San Francisco",
                            "state": "CA",
                            "coordinates": { "lat": 37.7, "lon": -122.4 }
                        }
                    },
                    "pending": false,
                    "type": { "primary": "special" },
                    "category": ["Transfer", "Withdrawal", "ATM"],
                    "category_id": "21012002"
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn omits_unset_options() {
        let body = serde_json::to_value(ConnectOptions::default()).unwrap();
        assert_eq!(body, json!({}));
        let body = serde_json::to_value(ConnectGetOptions {
            account: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({}));
    }

    #[test]
    fn serializes_set_options() {
        let options = ConnectOptions {
            webhook: Some("https://example.com/hook".into()),
            login_only: true,
            start_date: NaiveDate::from_ymd_opt(2014, 6, 1),
            ..Default::default()
        };
        let body = serde_json::to_value(&options).unwrap();
        assert_eq!(
            body,
            json!({
                "webhook": "https://example.com/hook",
                "login_only": true,
                "start_date": "2014-06-01"
            })
        );
    }

    #[test]
    fn add_user_request_shape() {
        let credentials = Credentials::new("plaid_test", "plaid_good").with_pin("1234");
        let body = serde_json::to_value(AddUserRequest {
            auth: AUTH,
            institution_type: "wells",
            credentials: &credentials,
            options: None,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "client_id": "test_id",
                "secret": "test_secret",
                "type": "wells",
                "username": "plaid_test",
                "password": "plaid_good",
                "pin": "1234"
            })
        );
    }

    #[test]
    fn empty_strings_are_sent_as_is() {
        let credentials = Credentials::new("", "");
        let body = serde_json::to_value(UpdateRequest {
            auth: AUTH,
            credentials: &credentials,
            mfa: None,
            access_token: "",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "client_id": "test_id",
                "secret": "test_secret",
                "username": "",
                "password": "",
                "access_token": ""
            })
        );
    }

    #[test]
    fn send_method_request_shape() {
        let body = serde_json::to_value(StepSendMethodRequest {
            auth: AUTH,
            access_token: "test_chase",
            options: SendMethodOptions {
                send_method: BTreeMap::from([("mask", "xxx-xxx-5309")]),
            },
        })
        .unwrap();
        assert_eq!(
            body["options"],
            json!({ "send_method": { "mask": "xxx-xxx-5309" } })
        );
        assert_eq!(body["client_id"], "test_id");
    }

    #[test]
    fn parses_connected_outcome() {
        let outcome = parse_outcome(&connected_payload()).expect("outcome should parse");
        assert!(!outcome.is_mfa_required());
        assert_eq!(outcome.access_token(), "test_chase");
        let response = outcome.connected().expect("connected branch");
        assert_eq!(response.accounts.len(), 1);
        let account = &response.accounts[0];
        assert_eq!(account.account_type.as_deref(), Some("depository"));
        assert_eq!(
            account.balance.available,
            Some(Decimal::from_str("1203.42").unwrap())
        );
        let txn = &response.transactions[0];
        assert_eq!(txn.amount, Decimal::from(200));
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2014, 7, 21).unwrap());
        assert_eq!(txn.category.as_ref().map(Vec::len), Some(3));
        let city = txn
            .meta
            .as_ref()
            .and_then(|m| m.location.as_ref())
            .and_then(|l| l.city.as_deref());
        assert_eq!(city, Some("San Francisco"));
    }

    #[test]
    fn parses_question_challenge() {
        let body = json!({
            "access_token": "test_bofa",
            "type": "questions",
            "mfa": [{ "question": "What is your first pet's name?" }]
        })
        .to_string();
        let mfa = parse_outcome(&body).unwrap().mfa().expect("mfa branch");
        assert_eq!(mfa.access_token, "test_bofa");
        assert_eq!(mfa.challenge.kind(), "questions");
        assert_eq!(
            mfa.challenge,
            MfaChallenge::Questions(vec![MfaQuestion {
                question: "What is your first pet's name?".into()
            }])
        );
    }

    #[test]
    fn parses_device_and_list_challenges() {
        let device = json!({
            "access_token": "test_chase",
            "type": "device",
            "mfa": { "message": "Code sent to xxx-xxx-5309" }
        })
        .to_string();
        let mfa = parse_outcome(&device).unwrap().mfa().unwrap();
        assert_eq!(mfa.challenge.kind(), "device");

        let list = json!({
            "access_token": "test_chase",
            "type": "list",
            "mfa": [
                { "mask": "xxx-xxx-5309", "type": "phone" },
                { "mask": "t..t@plaid.com", "type": "email" }
            ]
        })
        .to_string();
        match parse_outcome(&list).unwrap() {
            ConnectOutcome::MfaRequired(MfaResponse {
                challenge: MfaChallenge::List(methods),
                ..
            }) => {
                assert_eq!(methods.len(), 2);
                assert_eq!(methods[1].method_type, "email");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_selection_challenge() {
        let body = json!({
            "access_token": "test_usaa",
            "type": "selections",
            "mfa": [{ "question": "Favorite color?", "answers": ["blue", "red"] }]
        })
        .to_string();
        let mfa = parse_outcome(&body).unwrap().mfa().unwrap();
        assert_eq!(mfa.challenge.kind(), "selections");
    }

    #[test]
    fn keeps_token_for_unknown_challenge_type() {
        let body = json!({
            "access_token": "tok",
            "type": "code",
            "mfa": { "message": "x" }
        })
        .to_string();
        let mfa = parse_outcome(&body).unwrap().mfa().expect("mfa branch");
        assert_eq!(mfa.access_token, "tok");
        assert_eq!(mfa.challenge.kind(), "code");
        assert_eq!(
            mfa.challenge,
            MfaChallenge::Other {
                kind: "code".into(),
                mfa: json!({ "message": "x" })
            }
        );
    }

    #[test]
    fn rejects_malformed_known_challenge() {
        let body = json!({
            "access_token": "test_chase",
            "type": "device",
            "mfa": [{ "question": "not a device message" }]
        })
        .to_string();
        assert!(parse_outcome(&body).is_err());
    }

    #[test]
    fn rejects_challenge_without_type() {
        let body = json!({ "access_token": "test_chase", "mfa": [] }).to_string();
        assert!(parse_outcome(&body).is_err());
    }

    #[test]
    fn delete_response_requires_message() {
        assert!(serde_json::from_str::<DeleteResponse>("{}").is_err());
        let deleted: DeleteResponse =
            serde_json::from_str(r#"{"message":"Successfully removed from your account"}"#)
                .unwrap();
        assert_eq!(deleted.message, "Successfully removed from your account");
    }

    #[test]
    fn omits_empty_pin() {
        let body = serde_json::to_value(Credentials::new("u", "p").with_pin("")).unwrap();
        assert_eq!(body, json!({ "username": "u", "password": "p" }));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials::new("plaid_test", "plaid_good").with_pin("1234");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("plaid_test"));
        assert!(!rendered.contains("plaid_good"));
        assert!(!rendered.contains("1234"));
    }
}
