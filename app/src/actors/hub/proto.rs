//! SignalR JSON hub protocol: framing, handshake, and the few message types
//! the client cares about.
//!
//! Every frame is a JSON object terminated by the 0x1E record separator; one
//! WebSocket text message may carry several frames.

use reqwest::Url;
use serde::Deserialize;

use tictacdog::{Match, MatchError, MatchRecord};

pub(crate) const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub method the backend invokes with a full match record.
const RECEIVE_GAME: &str = "ReceiveGame";

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

pub(crate) fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

pub(crate) fn ping_frame() -> String {
    format!(r#"{{"type":{PING}}}{RECORD_SEPARATOR}"#)
}

/// WebSocket endpoint for the hub at `base` (http or ws), identifying as
/// `user_id`. The token travels as `access_token`, which is where hub
/// servers look for it on WebSocket upgrades.
///
/// The socket is plain TCP only, so `https`/`wss` endpoints are refused here
/// rather than failing on every connect.
pub(crate) fn hub_url(base: &str, user_id: &str, token: Option<&str>) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid hub url '{base}': {e}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => {
            return Err(format!(
                "secure hub url '{base}' is not supported, use an http:// or ws:// endpoint"
            ));
        }
        other => return Err(format!("unsupported hub url scheme '{other}'")),
    };
    url.set_scheme(scheme)
        .map_err(|()| format!("cannot use scheme '{scheme}' for '{base}'"))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("userId", user_id);
        if let Some(token) = token {
            query.append_pair("access_token", token);
        }
    }
    Ok(url)
}

/// One decoded hub frame.
#[derive(Debug, PartialEq)]
pub(crate) enum HubFrame {
    /// Handshake response. `Some(error)` if the server refused the protocol.
    Handshake(Option<String>),
    /// `ReceiveGame` invocation carrying a match.
    Game(Box<Match>),
    Ping,
    /// Server is closing the connection.
    Close(Option<String>),
    /// Any other invocation target or message type.
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum FrameError {
    #[error("undecodable frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ReceiveGame invocation without a match argument")]
    MissingArgument,
    #[error("invalid match: {0}")]
    Match(#[from] MatchError),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<u8>,
    #[serde(default)]
    target: String,
    #[serde(default)]
    arguments: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Split a text message into frames and decode each one.
pub(crate) fn parse_frames(text: &str) -> Vec<Result<HubFrame, FrameError>> {
    text.split(RECORD_SEPARATOR)
        .filter(|frame| !frame.trim().is_empty())
        .map(parse_frame)
        .collect()
}

fn parse_frame(frame: &str) -> Result<HubFrame, FrameError> {
    let raw: RawFrame = serde_json::from_str(frame)?;
    match raw.kind {
        None => Ok(HubFrame::Handshake(raw.error)),
        Some(INVOCATION) if raw.target.eq_ignore_ascii_case(RECEIVE_GAME) => {
            let argument = raw
                .arguments
                .into_iter()
                .next()
                .ok_or(FrameError::MissingArgument)?;
            let record: MatchRecord = serde_json::from_value(argument)?;
            Ok(HubFrame::Game(Box::new(Match::try_from(record)?)))
        }
        Some(INVOCATION) => Ok(HubFrame::Other(raw.target)),
        Some(PING) => Ok(HubFrame::Ping),
        Some(CLOSE) => Ok(HubFrame::Close(raw.error)),
        Some(kind) => Ok(HubFrame::Other(format!("type {kind}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_frame(cell5: i64) -> String {
        format!(
            r#"{{"type":1,"target":"receiveGame","arguments":[{{"id":3,"cell1":0,"cell2":0,"cell3":0,"cell4":0,"cell5":{cell5},"cell6":0,"cell7":0,"cell8":0,"cell9":0,"senderId":"bob","receiverId":"bob","firstPlayerId":"alice"}}]}}{RECORD_SEPARATOR}"#
        )
    }

    #[test]
    fn handshake_and_ping_are_separator_terminated() {
        assert_eq!(
            handshake_request(),
            "{\"protocol\":\"json\",\"version\":1}\u{1e}"
        );
        assert_eq!(ping_frame(), "{\"type\":6}\u{1e}");
    }

    #[test]
    fn builds_websocket_url() {
        let url = hub_url("http://localhost:5266/chatHub", "alice", None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5266/chatHub?userId=alice");

        let url = hub_url("ws://chat.example/chatHub", "a b", Some("t0k")).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://chat.example/chatHub?userId=a+b&access_token=t0k"
        );

        let err = hub_url("https://chat.example/chatHub", "alice", None).unwrap_err();
        assert!(err.contains("not supported"), "{err}");
        assert!(hub_url("wss://chat.example/chatHub", "alice", None).is_err());

        assert!(hub_url("ftp://chat.example/hub", "alice", None).is_err());
        assert!(hub_url("not a url", "alice", None).is_err());
    }

    #[test]
    fn parses_handshake_responses() {
        assert_eq!(
            parse_frames("{}\u{1e}").pop().unwrap().unwrap(),
            HubFrame::Handshake(None)
        );
        assert_eq!(
            parse_frames("{\"error\":\"bad protocol\"}\u{1e}")
                .pop()
                .unwrap()
                .unwrap(),
            HubFrame::Handshake(Some("bad protocol".into()))
        );
    }

    #[test]
    fn parses_game_invocation_case_insensitively() {
        let frames = parse_frames(&game_frame(-2));
        assert_eq!(frames.len(), 1);
        let Ok(HubFrame::Game(game)) = &frames[0] else {
            panic!("expected a game frame, got {:?}", frames[0]);
        };
        assert_eq!(game.id, 3);
        assert_eq!(game.cells()[4], -2);
        assert_eq!(game.last_mover_id, "bob");
        assert!(game.is_between("alice", "bob"));
    }

    #[test]
    fn splits_batched_frames() {
        let text = format!(
            "{{\"type\":6}}\u{1e}{}{{\"type\":7,\"error\":\"bye\"}}\u{1e}",
            game_frame(1)
        );
        let frames: Vec<_> = parse_frames(&text)
            .into_iter()
            .map(|frame| frame.unwrap())
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], HubFrame::Ping);
        assert!(matches!(frames[1], HubFrame::Game(_)));
        assert_eq!(frames[2], HubFrame::Close(Some("bye".into())));
    }

    #[test]
    fn chat_messages_and_other_types_are_passed_over() {
        let text = "{\"type\":1,\"target\":\"ReceiveMessage\",\"arguments\":[{\"content\":\"hi\"}]}\u{1e}{\"type\":3,\"invocationId\":\"1\"}\u{1e}";
        let frames: Vec<_> = parse_frames(text)
            .into_iter()
            .map(|frame| frame.unwrap())
            .collect();
        assert_eq!(
            frames,
            vec![
                HubFrame::Other("ReceiveMessage".into()),
                HubFrame::Other("type 3".into())
            ]
        );
    }

    #[test]
    fn reports_bad_frames() {
        let frames = parse_frames(&game_frame(5));
        assert!(matches!(
            frames[0],
            Err(FrameError::Match(MatchError::CellOutOfRange { index: 4, value: 5 }))
        ));

        let frames = parse_frames("{\"type\":1,\"target\":\"ReceiveGame\",\"arguments\":[]}\u{1e}");
        assert!(matches!(frames[0], Err(FrameError::MissingArgument)));

        let frames = parse_frames("{not json\u{1e}");
        assert!(matches!(frames[0], Err(FrameError::Json(_))));
    }
}
