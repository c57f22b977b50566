pub mod envelope;

pub use envelope::{
    Envelope, EnvelopeKind, FollowRequest, FriendRequest, ListFriendRequests, Login, Post,
    ProtocolError, Response,
};
