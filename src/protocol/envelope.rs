use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope has no type discriminant")]
    MissingType,

    #[error("unknown envelope type: {0}")]
    UnknownType(String),
}

/// Discriminant of an [`Envelope`], read before the payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Login,
    Post,
    FollowRequest,
    FriendRequest,
    ListFriendRequests,
    LoginResponse,
    ServerResponse,
}

impl EnvelopeKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "login" => EnvelopeKind::Login,
            "post" => EnvelopeKind::Post,
            "makeFollowRequest" => EnvelopeKind::FollowRequest,
            "makeFriendRequest" => EnvelopeKind::FriendRequest,
            "listFriendRequests" => EnvelopeKind::ListFriendRequests,
            "loginResponse" => EnvelopeKind::LoginResponse,
            "serverResponse" => EnvelopeKind::ServerResponse,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(self) -> &'static str {
        match self {
            EnvelopeKind::Login => "login",
            EnvelopeKind::Post => "post",
            EnvelopeKind::FollowRequest => "makeFollowRequest",
            EnvelopeKind::FriendRequest => "makeFriendRequest",
            EnvelopeKind::ListFriendRequests => "listFriendRequests",
            EnvelopeKind::LoginResponse => "loginResponse",
            EnvelopeKind::ServerResponse => "serverResponse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowRequest {
    #[serde(rename = "requestor_id")]
    pub requestor: String,
    #[serde(rename = "followed_id")]
    pub followed: String,
}

/// Older clients reuse the follow request's `followed_id` field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    #[serde(rename = "requestor_id")]
    pub requestor: String,
    #[serde(rename = "requested_id", alias = "followed_id")]
    pub requested: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListFriendRequests {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// One unit of the wire protocol. Serialized as a flat JSON object whose
/// `type` field names the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "login")]
    Login(Login),
    #[serde(rename = "post")]
    Post(Post),
    #[serde(rename = "makeFollowRequest")]
    FollowRequest(FollowRequest),
    #[serde(rename = "makeFriendRequest")]
    FriendRequest(FriendRequest),
    #[serde(rename = "listFriendRequests")]
    ListFriendRequests(ListFriendRequests),
    #[serde(rename = "loginResponse")]
    LoginResponse(Response),
    #[serde(rename = "serverResponse")]
    ServerResponse(Response),
}

#[derive(Deserialize)]
struct Peek {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl Envelope {
    /// Decode in two steps: read the `type` discriminant, then decode the
    /// payload for that variant. Unknown discriminants are reported as
    /// [`ProtocolError::UnknownType`] so callers can drop them without
    /// treating the frame as malformed.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let peek: Peek = serde_json::from_str(raw)?;
        let tag = peek.kind.ok_or(ProtocolError::MissingType)?;
        if EnvelopeKind::from_tag(&tag).is_none() {
            return Err(ProtocolError::UnknownType(tag));
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Login(_) => EnvelopeKind::Login,
            Envelope::Post(_) => EnvelopeKind::Post,
            Envelope::FollowRequest(_) => EnvelopeKind::FollowRequest,
            Envelope::FriendRequest(_) => EnvelopeKind::FriendRequest,
            Envelope::ListFriendRequests(_) => EnvelopeKind::ListFriendRequests,
            Envelope::LoginResponse(_) => EnvelopeKind::LoginResponse,
            Envelope::ServerResponse(_) => EnvelopeKind::ServerResponse,
        }
    }

    pub fn login_response(success: bool, message: impl Into<String>) -> Self {
        Envelope::LoginResponse(Response {
            success,
            message: Some(message.into()),
            ..Response::default()
        })
    }

    pub fn server_response(username: &str, success: bool, content: impl Into<String>) -> Self {
        Envelope::ServerResponse(Response {
            success,
            content: Some(content.into()),
            username: Some(username.to_string()),
            ..Response::default()
        })
    }

    pub fn post(username: &str, content: impl Into<String>) -> Self {
        Envelope::Post(Post {
            username: username.to_string(),
            content: content.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_login() {
        let env = Envelope::decode(r#"{"type":"login","username":"alice","password":"pw"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Login(Login {
                username: "alice".to_string(),
                password: "pw".to_string(),
            })
        );
        assert_eq!(env.kind(), EnvelopeKind::Login);
    }

    #[test]
    fn test_decode_follow_request_field_names() {
        let env = Envelope::decode(
            r#"{"type":"makeFollowRequest","requestor_id":"alice","followed_id":"bob"}"#,
        )
        .unwrap();
        match env {
            Envelope::FollowRequest(req) => {
                assert_eq!(req.requestor, "alice");
                assert_eq!(req.followed, "bob");
            }
            other => panic!("unexpected envelope {:?}", other),
        }
    }

    #[test]
    fn test_friend_request_accepts_legacy_field() {
        let legacy = Envelope::decode(
            r#"{"type":"makeFriendRequest","requestor_id":"dave","followed_id":"carol"}"#,
        )
        .unwrap();
        let current = Envelope::decode(
            r#"{"type":"makeFriendRequest","requestor_id":"dave","requested_id":"carol"}"#,
        )
        .unwrap();
        assert_eq!(legacy, current);

        let encoded = current.encode().unwrap();
        assert!(encoded.contains("\"requested_id\":\"carol\""));
    }

    #[test]
    fn test_unknown_type_is_distinguished() {
        let err = Envelope::decode(r#"{"type":"acceptFriendRequest","username":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(tag) if tag == "acceptFriendRequest"));
    }

    #[test]
    fn test_missing_type_and_garbage() {
        assert!(matches!(
            Envelope::decode(r#"{"username":"x"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            Envelope::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_discriminant_must_match_payload() {
        // A post tag with a login-shaped body is rejected, not coerced.
        let err = Envelope::decode(r#"{"type":"post","username":"a","password":"b"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_response_encoding_omits_empty_fields() {
        let encoded = Envelope::login_response(true, "Login successful!").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "loginResponse");
        assert_eq!(value["success"], true);
        assert!(value.get("content").is_none());

        let encoded = Envelope::server_response("carol", true, "").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "serverResponse");
        assert_eq!(value["content"], "");
        assert_eq!(value["username"], "carol");
    }

    #[test]
    fn test_kind_tags_match_serde_names() {
        let samples = [
            Envelope::login_response(false, "no"),
            Envelope::server_response("a", true, "x"),
            Envelope::post("a", "hi"),
        ];
        for env in samples {
            let value: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
            assert_eq!(value["type"], env.kind().tag());
            assert_eq!(EnvelopeKind::from_tag(env.kind().tag()), Some(env.kind()));
        }
    }
}
