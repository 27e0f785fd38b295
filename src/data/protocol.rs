use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::data::types::Tick;

/// API token. Serialized as-is, never printed.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    pub end: String,
    pub count: u32,
    pub subscribe: u8,
    pub style: String,
    pub req_id: u64,
}

impl TicksHistoryRequest {
    pub fn latest(symbol: &str, count: u32, req_id: u64) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            end: "latest".to_string(),
            count,
            subscribe: 0,
            style: "ticks".to_string(),
            req_id,
        }
    }
}

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Authorize { authorize: Credential },
    Ping { ping: u8 },
    TicksHistory(TicksHistoryRequest),
}

impl OutboundMessage {
    pub fn authorize(token: &Credential) -> Self {
        OutboundMessage::Authorize { authorize: token.clone() }
    }

    pub fn ping() -> Self {
        OutboundMessage::Ping { ping: 1 }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    msg_type: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    authorize: Option<AuthorizeBody>,
    #[serde(default)]
    history: Option<HistoryBody>,
    #[serde(default)]
    echo_req: Option<Value>,
    #[serde(default)]
    req_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeBody {
    #[serde(default)]
    loginid: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    prices: Option<Vec<Value>>,
    #[serde(default)]
    times: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub msg_type: Option<String>,
    pub req_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeResponse {
    pub loginid: Option<String>,
    pub currency: Option<String>,
}

impl AuthorizeResponse {
    /// `"<loginid> (<currency>)"`, or `None` when either identity field is
    /// missing or blank.
    pub fn account_label(&self) -> Option<String> {
        let loginid = self.loginid.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let currency = self.currency.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(format!("{} ({})", loginid, currency))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryResponse {
    pub req_id: Option<u64>,
    pub symbol: Option<String>,
    pub prices: Option<Vec<Value>>,
    pub times: Vec<Value>,
}

impl HistoryResponse {
    /// Number of raw entries in the price list.
    pub fn received(&self) -> usize {
        self.prices.as_ref().map_or(0, Vec::len)
    }

    /// Parse the price list into ticks, dropping entries that are not finite
    /// numbers (or numeric strings). Times are paired by position when the
    /// server sent a `times` array of the same length.
    pub fn parse_ticks(&self) -> Option<Vec<Tick>> {
        let prices = self.prices.as_ref()?;
        let paired = self.times.len() == prices.len();

        let ticks = prices
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let price = parse_number(raw).filter(|p| p.is_finite())?;
                let epoch = if paired {
                    parse_number(&self.times[i]).map(|t| t as i64)
                } else {
                    None
                };
                Some(Tick { price, epoch })
            })
            .collect();

        Some(ticks)
    }
}

fn parse_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Inbound messages, dispatched on `msg_type`. An `error` object wins over
/// any discriminant.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Authorize(AuthorizeResponse),
    History(HistoryResponse),
    Pong,
    Error(ApiError),
    Other(Option<String>),
}

impl InboundMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;

        if let Some(err) = envelope.error {
            return Ok(InboundMessage::Error(ApiError {
                code: err.code.unwrap_or_else(|| "Unknown".to_string()),
                message: err.message.unwrap_or_else(|| "Unspecified API error".to_string()),
                msg_type: envelope.msg_type,
                req_id: envelope.req_id,
            }));
        }

        let message = match envelope.msg_type.as_deref() {
            Some("authorize") => {
                let body = envelope.authorize.unwrap_or(AuthorizeBody {
                    loginid: None,
                    currency: None,
                });
                InboundMessage::Authorize(AuthorizeResponse {
                    loginid: body.loginid,
                    currency: body.currency,
                })
            }
            Some("history") => {
                let symbol = envelope
                    .echo_req
                    .as_ref()
                    .and_then(|echo| echo.get("ticks_history"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let (prices, times) = match envelope.history {
                    Some(h) => (h.prices, h.times),
                    None => (None, Vec::new()),
                };
                InboundMessage::History(HistoryResponse {
                    req_id: envelope.req_id,
                    symbol,
                    prices,
                    times,
                })
            }
            Some("ping") => InboundMessage::Pong,
            _ => InboundMessage::Other(envelope.msg_type.clone()),
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_wire_shapes() {
        let auth = OutboundMessage::authorize(&Credential::new(" abc123 "));
        assert_eq!(serde_json::to_value(&auth).unwrap(), json!({"authorize": "abc123"}));

        assert_eq!(serde_json::to_value(OutboundMessage::ping()).unwrap(), json!({"ping": 1}));

        let history = OutboundMessage::TicksHistory(TicksHistoryRequest::latest("R_100", 1000, 7));
        assert_eq!(
            serde_json::to_value(&history).unwrap(),
            json!({
                "ticks_history": "R_100",
                "end": "latest",
                "count": 1000,
                "subscribe": 0,
                "style": "ticks",
                "req_id": 7
            })
        );
    }

    #[test]
    fn test_credential_is_redacted() {
        let auth = OutboundMessage::authorize(&Credential::new("secret-token"));
        assert!(!format!("{:?}", auth).contains("secret-token"));
    }

    #[test]
    fn test_error_takes_precedence() {
        let text = r#"{"msg_type":"authorize","error":{"code":"InvalidToken","message":"The token is invalid."}}"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::Error(err) => {
                assert_eq!(err.code, "InvalidToken");
                assert_eq!(err.msg_type.as_deref(), Some("authorize"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_authorize_label() {
        let text = r#"{"msg_type":"authorize","authorize":{"loginid":"CR90000","currency":"USD"}}"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::Authorize(auth) => {
                assert_eq!(auth.account_label().as_deref(), Some("CR90000 (USD)"));
            }
            other => panic!("expected authorize, got {:?}", other),
        }

        let missing = AuthorizeResponse { loginid: Some("CR1".to_string()), currency: Some(" ".to_string()) };
        assert_eq!(missing.account_label(), None);
    }

    #[test]
    fn test_history_parses_mixed_entries() {
        let text = r#"{
            "msg_type":"history",
            "req_id": 3,
            "echo_req":{"ticks_history":"R_50","count":4},
            "history":{"prices":["1.05", 1.10, "oops", null],"times":[1,2,3,4]}
        }"#;
        let history = match InboundMessage::parse(text).unwrap() {
            InboundMessage::History(h) => h,
            other => panic!("expected history, got {:?}", other),
        };

        assert_eq!(history.req_id, Some(3));
        assert_eq!(history.symbol.as_deref(), Some("R_50"));
        assert_eq!(history.received(), 4);

        let ticks = history.parse_ticks().unwrap();
        assert_eq!(ticks, vec![
            Tick { price: 1.05, epoch: Some(1) },
            Tick { price: 1.10, epoch: Some(2) },
        ]);
    }

    #[test]
    fn test_history_without_prices() {
        let history = match InboundMessage::parse(r#"{"msg_type":"history"}"#).unwrap() {
            InboundMessage::History(h) => h,
            other => panic!("expected history, got {:?}", other),
        };
        assert_eq!(history.parse_ticks(), None);
    }

    #[test]
    fn test_non_finite_strings_are_dropped() {
        let history = HistoryResponse {
            req_id: None,
            symbol: None,
            prices: Some(vec![json!("NaN"), json!("inf"), json!("2.50")]),
            times: Vec::new(),
        };
        assert_eq!(history.parse_ticks().unwrap(), vec![Tick::new(2.5)]);
    }

    #[test]
    fn test_unknown_discriminants_are_other() {
        assert_eq!(
            InboundMessage::parse(r#"{"msg_type":"tick","tick":{}}"#).unwrap(),
            InboundMessage::Other(Some("tick".to_string()))
        );
        assert_eq!(InboundMessage::parse(r#"{"msg_type":"ping","ping":"pong"}"#).unwrap(), InboundMessage::Pong);
        assert!(InboundMessage::parse("not json").is_err());
    }
}
