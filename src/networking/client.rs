// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Typed outbound RPC calls to peer nodes.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Outbound call timeout.
const RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or timeout.
    #[error("transport: {0}")]
    Transport(String),
    /// Peer answered with a non-success status.
    #[error("peer {0}:{1} answered {2}: {3}")]
    Status(String, u16, u16, String),
    /// Response body did not parse.
    #[error("bad response from {0}:{1}")]
    BadResponse(String, u16),
}

/// `GET /info` response.
#[derive(Debug, Deserialize)]
pub struct PeerInfo {
    /// active / synchronizing / inactive.
    pub status: String,
    /// Peer ip.
    pub ip: String,
    /// Peer hostname.
    pub hostname: String,
    /// Peer identifier, hyphenless hex.
    pub identifier: String,
}

/// Shared HTTP client over the peer API.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    /// Build with the protocol timeout.
    pub fn new() -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    fn url(host: &str, port: u16, path: &str) -> String {
        format!("http://{host}:{port}{path}")
    }

    async fn check(
        host: &str,
        port: u16,
        res: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, ClientError> {
        let res = res.map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientError::Status(host.to_string(), port, status.as_u16(), body));
        }
        Ok(res)
    }

    /// `GET /info`.
    pub async fn get_info(&self, host: &str, port: u16) -> Result<PeerInfo, ClientError> {
        let res = self.http.get(Self::url(host, port, "/info")).send().await;
        Self::check(host, port, res)
            .await?
            .json()
            .await
            .map_err(|_| ClientError::BadResponse(host.to_string(), port))
    }

    /// `GET /public-key`: PEM SubjectPublicKeyInfo.
    pub async fn get_public_key(&self, host: &str, port: u16) -> Result<String, ClientError> {
        let res = self.http.get(Self::url(host, port, "/public-key")).send().await;
        Self::check(host, port, res)
            .await?
            .text()
            .await
            .map_err(|_| ClientError::BadResponse(host.to_string(), port))
    }

    /// `GET /node/{id}`: whether the peer knows this node.
    pub async fn node_exists(&self, host: &str, port: u16, id: &Uuid) -> Result<bool, ClientError> {
        let url = Self::url(host, port, &format!("/node/{}", id.simple()));
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(res.status().is_success())
    }

    /// `POST /node/register` against the bootstrap peer.
    pub async fn register_node(
        &self,
        host: &str,
        port: u16,
        identifier: &Uuid,
        self_port: u16,
        type_name: &str,
    ) -> Result<(), ClientError> {
        let body = json!({
            "identifier": identifier.simple().to_string(),
            "port": self_port,
            "type": type_name,
        });
        let res = self.http.post(Self::url(host, port, "/node/register")).json(&body).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `GET /node/update`: chain and roster snapshot.
    pub async fn get_node_update(&self, host: &str, port: u16) -> Result<Value, ClientError> {
        let res = self.http.get(Self::url(host, port, "/node/update")).send().await;
        Self::check(host, port, res)
            .await?
            .json()
            .await
            .map_err(|_| ClientError::BadResponse(host.to_string(), port))
    }

    /// `POST /node/populate-new`: introduce a freshly registered node.
    pub async fn send_node_populate(
        &self,
        host: &str,
        port: u16,
        payload: &Value,
    ) -> Result<(), ClientError> {
        let res =
            self.http.post(Self::url(host, port, "/node/populate-new")).json(payload).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /transaction/{id}/populate`: gossip an admitted transaction.
    pub async fn send_transaction_populate(
        &self,
        host: &str,
        port: u16,
        id: &Uuid,
        tx_bytes: Vec<u8>,
    ) -> Result<(), ClientError> {
        let url = Self::url(host, port, &format!("/transaction/{}/populate", id.simple()));
        let res = self.http.post(url).body(tx_bytes).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /transaction/{id}/verifyResult`: gossip one vote.
    pub async fn send_verify_result(
        &self,
        host: &str,
        port: u16,
        id: &Uuid,
        result: bool,
        message: Option<&str>,
    ) -> Result<(), ClientError> {
        let url = Self::url(host, port, &format!("/transaction/{}/verifyResult", id.simple()));
        let body = json!({ "result": result, "message": message });
        let res = self.http.post(url).json(&body).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `GET /transaction/{id}`: raw transaction bytes.
    pub async fn get_transaction(
        &self,
        host: &str,
        port: u16,
        id: &Uuid,
    ) -> Result<Vec<u8>, ClientError> {
        let url = Self::url(host, port, &format!("/transaction/{}", id.simple()));
        let res = self.http.get(url).send().await;
        let bytes = Self::check(host, port, res)
            .await?
            .bytes()
            .await
            .map_err(|_| ClientError::BadResponse(host.to_string(), port))?;
        Ok(bytes.to_vec())
    }

    /// `POST /transaction/{id}/verified`: announce a promotion.
    pub async fn send_transaction_verified(
        &self,
        host: &str,
        port: u16,
        id: &Uuid,
        body: String,
    ) -> Result<(), ClientError> {
        let url = Self::url(host, port, &format!("/transaction/{}/verified", id.simple()));
        let res = self.http.post(url).body(body).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /blockchain/block/new`: broadcast a sealed block.
    pub async fn send_new_block(
        &self,
        host: &str,
        port: u16,
        block_bytes: Vec<u8>,
    ) -> Result<(), ClientError> {
        let res =
            self.http.post(Self::url(host, port, "/blockchain/block/new")).body(block_bytes).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `PATCH /node/{id}/trust`: propagate a trust-change event.
    pub async fn send_trust_change(
        &self,
        host: &str,
        port: u16,
        target: &Uuid,
        payload: &Value,
    ) -> Result<(), ClientError> {
        let url = Self::url(host, port, &format!("/node/{}/trust", target.simple()));
        let res = self.http.patch(url).json(payload).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /node/validator/new`: announce an installed validator set.
    pub async fn send_validators_list(
        &self,
        host: &str,
        port: u16,
        validators: &[Uuid],
    ) -> Result<(), ClientError> {
        let body = json!({
            "validators": validators.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>(),
        });
        let res =
            self.http.post(Self::url(host, port, "/node/validator/new")).json(&body).send().await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /node/validator/agreement`: propose a committee.
    pub async fn send_agreement_start(
        &self,
        host: &str,
        port: u16,
        list: &[Uuid],
    ) -> Result<(), ClientError> {
        let body = json!({
            "list": list.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>(),
        });
        let res = self
            .http
            .post(Self::url(host, port, "/node/validator/agreement"))
            .json(&body)
            .send()
            .await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `POST /node/validator/agreement/done`: announce a closed round.
    pub async fn send_agreement_done(
        &self,
        host: &str,
        port: u16,
        validators: &[Uuid],
        leader: &Uuid,
    ) -> Result<(), ClientError> {
        let body = json!({
            "validators": validators.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>(),
            "leader": leader.simple().to_string(),
        });
        let res = self
            .http
            .post(Self::url(host, port, "/node/validator/agreement/done"))
            .json(&body)
            .send()
            .await;
        Self::check(host, port, res).await.map(|_| ())
    }

    /// `PATCH /node/validator/agreement/vote`: gossip an agreement vote.
    pub async fn send_agreement_vote(
        &self,
        host: &str,
        port: u16,
        result: bool,
    ) -> Result<(), ClientError> {
        let body = json!({ "result": result });
        let res = self
            .http
            .patch(Self::url(host, port, "/node/validator/agreement/vote"))
            .json(&body)
            .send()
            .await;
        Self::check(host, port, res).await.map(|_| ())
    }
}
