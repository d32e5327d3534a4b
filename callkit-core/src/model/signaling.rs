use crate::model::participant::ParticipantId;
use crate::model::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Join,
    PeerJoined,
    Offer,
    Answer,
    IceCandidate,
    PeerLeft,
    Leave,
}

impl SignalKind {
    /// Kinds a coordinator subscribes to for its room.
    pub const INBOUND: [SignalKind; 6] = [
        SignalKind::Join,
        SignalKind::PeerJoined,
        SignalKind::Offer,
        SignalKind::Answer,
        SignalKind::IceCandidate,
        SignalKind::PeerLeft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Join => "join",
            SignalKind::PeerJoined => "peer-joined",
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::PeerLeft => "peer-left",
            SignalKind::Leave => "leave",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SdpBlob {
    pub sdp: String,
}

/// A trickled ICE candidate, in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateDescriptor {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SignalPayload {
    Sdp(SdpBlob),
    Candidate(IceCandidateDescriptor),
}

/// One message of the peer-to-peer signaling protocol, routed by the relay within a call room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub session_id: SessionId,
    pub from_participant_id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SignalPayload>,
}

impl SignalMessage {
    pub fn new(kind: SignalKind, session_id: SessionId, from: ParticipantId) -> Self {
        Self {
            kind,
            session_id,
            from_participant_id: from,
            payload: None,
        }
    }

    pub fn offer(session_id: SessionId, from: ParticipantId, sdp: String) -> Self {
        Self::new(SignalKind::Offer, session_id, from).with_payload(SignalPayload::Sdp(SdpBlob { sdp }))
    }

    pub fn answer(session_id: SessionId, from: ParticipantId, sdp: String) -> Self {
        Self::new(SignalKind::Answer, session_id, from).with_payload(SignalPayload::Sdp(SdpBlob { sdp }))
    }

    pub fn ice_candidate(
        session_id: SessionId,
        from: ParticipantId,
        candidate: IceCandidateDescriptor,
    ) -> Self {
        Self::new(SignalKind::IceCandidate, session_id, from)
            .with_payload(SignalPayload::Candidate(candidate))
    }

    pub fn with_payload(mut self, payload: SignalPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn sdp(&self) -> Option<&str> {
        match &self.payload {
            Some(SignalPayload::Sdp(blob)) => Some(&blob.sdp),
            _ => None,
        }
    }

    pub fn candidate(&self) -> Option<&IceCandidateDescriptor> {
        match &self.payload {
            Some(SignalPayload::Candidate(c)) => Some(c),
            _ => None,
        }
    }
}
