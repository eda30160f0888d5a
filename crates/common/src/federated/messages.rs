//! Request/response boundary of the coordinator
//!
//! Every operation has an explicit tagged request, so malformed payloads are
//!  rejected while deserializing and never reach the coordinator.
//!
//! ```json
//! {"op": "submit_update", "client_id": "hospital-a", "weight_delta": [0.1], "bias_delta": 0.0, "num_samples": 120}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::coordinator::{
    ClientInfo, Coordinator, CoordinatorError, CoordinatorStatus, RoundRecord,
};
use super::model::GlobalModel;
use super::update::{ClientId, ClientUpdate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Zero-initialise; `num_features` falls back to the configured value
    InitModel {
        #[serde(default)]
        num_features: Option<usize>,
    },
    InitModelWith {
        weights: Vec<f64>,
        bias: f64,
    },
    Reset,
    Register {
        client_id: ClientId,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    Unregister {
        client_id: ClientId,
    },
    Clients,
    StartRound,
    SubmitUpdate(ClientUpdate),
    Aggregate,
    GetModel,
    Status,
    History,
    Predict {
        samples: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Model(GlobalModel),
    Reset,
    Registered {
        client_id: ClientId,
        newly_registered: bool,
    },
    Unregistered {
        client_id: ClientId,
        removed: bool,
    },
    Clients {
        clients: Vec<ClientInfo>,
    },
    RoundStarted {
        round: u32,
        model: GlobalModel,
    },
    UpdateReceived {
        client_id: ClientId,
        round: u32,
        pending_updates: usize,
    },
    RoundCompleted {
        record: RoundRecord,
        model: GlobalModel,
    },
    Status(CoordinatorStatus),
    History {
        rounds: Vec<RoundRecord>,
    },
    Predictions {
        probabilities: Vec<f64>,
        labels: Vec<u8>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl From<CoordinatorError> for Response {
    fn from(err: CoordinatorError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl Coordinator {
    /// Dispatch one boundary request
    ///
    /// Coordinator errors come back as [`Response::Error`] rather than
    ///  failing the call.
    pub fn handle(&self, request: Request) -> Response {
        self.try_handle(request).unwrap_or_else(Response::from)
    }

    fn try_handle(&self, request: Request) -> Result<Response, CoordinatorError> {
        let response = match request {
            Request::InitModel { num_features } => {
                let num_features = num_features.unwrap_or(self.settings().num_features);
                Response::Model(self.init_model(num_features)?)
            }
            Request::InitModelWith { weights, bias } => {
                Response::Model(self.init_model_with(weights, bias)?)
            }
            Request::Reset => {
                self.reset()?;
                Response::Reset
            }
            Request::Register {
                client_id,
                metadata,
            } => {
                let newly_registered = self.register_client_with(&client_id, metadata);
                Response::Registered {
                    client_id,
                    newly_registered,
                }
            }
            Request::Unregister { client_id } => {
                let removed = self.unregister_client(&client_id);
                Response::Unregistered { client_id, removed }
            }
            Request::Clients => Response::Clients {
                clients: self.clients(),
            },
            Request::StartRound => {
                let model = self.start_round()?;
                Response::RoundStarted {
                    round: model.round + 1,
                    model,
                }
            }
            Request::SubmitUpdate(update) => {
                let receipt = self.submit_update(update)?;
                Response::UpdateReceived {
                    client_id: receipt.client_id,
                    round: receipt.round,
                    pending_updates: receipt.pending_updates,
                }
            }
            Request::Aggregate => {
                let (model, record) = self.aggregate()?;
                Response::RoundCompleted { record, model }
            }
            Request::GetModel => Response::Model(self.model()?),
            Request::Status => Response::Status(self.status()),
            Request::History => Response::History {
                rounds: self.history(),
            },
            Request::Predict { samples } => {
                let probabilities = self.predict_proba(&samples)?;
                let labels = probabilities
                    .iter()
                    .map(|p| u8::from(*p >= super::model::DECISION_THRESHOLD))
                    .collect();
                Response::Predictions {
                    probabilities,
                    labels,
                }
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::federated::FederatedSettings;

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_str(
            r#"{"op":"submit_update","client_id":"a","weight_delta":[1.0],"bias_delta":0.5,"num_samples":3}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::SubmitUpdate(ClientUpdate::new("a", vec![1.0], 0.5, 3))
        );

        let request: Request = serde_json::from_str(r#"{"op":"init_model"}"#).unwrap();
        assert_eq!(request, Request::InitModel { num_features: None });

        assert!(serde_json::from_str::<Request>(r#"{"op":"launch_missiles"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"op":"register"}"#).is_err());
    }

    #[test]
    fn test_handle_round_trip() {
        let coordinator = Coordinator::new(FederatedSettings {
            num_features: 2,
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            coordinator.handle(Request::InitModel { num_features: None }),
            Response::Model(GlobalModel { num_features: 2, .. })
        ));
        for id in ["a", "b"] {
            coordinator.handle(Request::Register {
                client_id: id.to_string(),
                metadata: BTreeMap::new(),
            });
        }
        assert!(matches!(
            coordinator.handle(Request::StartRound),
            Response::RoundStarted { round: 1, .. }
        ));
        coordinator.handle(Request::SubmitUpdate(ClientUpdate::new("a", vec![1.0, 1.0], 0.0, 1)));
        let response = coordinator.handle(Request::SubmitUpdate(ClientUpdate::new(
            "a",
            vec![1.0, 1.0],
            0.0,
            1,
        )));
        assert_eq!(
            response,
            Response::Error {
                kind: "duplicate_submission".to_string(),
                message: "client 'a' already submitted an update this round".to_string(),
            }
        );

        let response = coordinator.handle(Request::Aggregate);
        let Response::RoundCompleted { model, record } = response else {
            panic!("unexpected response: {:?}", response);
        };
        assert_eq!(model.round, 1);
        assert_eq!(record.num_clients, 1);

        let json = serde_json::to_value(coordinator.handle(Request::Status)).unwrap();
        assert_eq!(json["status"], "status");
        assert_eq!(json["current_round"], 1);
        assert_eq!(json["state"], "idle");
    }

    #[test]
    fn test_clients_request() {
        let coordinator = Coordinator::default();
        let request: Request = serde_json::from_str(
            r#"{"op":"register","client_id":"hospital-a","metadata":{"region":"eu"}}"#,
        )
        .unwrap();
        coordinator.handle(request);
        let request: Request =
            serde_json::from_str(r#"{"op":"register","client_id":"hospital-b"}"#).unwrap();
        coordinator.handle(request);

        let request: Request = serde_json::from_str(r#"{"op":"clients"}"#).unwrap();
        let response = coordinator.handle(request);
        let Response::Clients { clients } = &response else {
            panic!("unexpected response: {:?}", response);
        };
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].client_id, "hospital-a");
        assert_eq!(clients[0].metadata.get("region").map(String::as_str), Some("eu"));
        assert!(clients[1].metadata.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "clients");
        assert_eq!(json["clients"][1]["client_id"], "hospital-b");
        assert_eq!(json["clients"][0]["rounds_participated"], 0);
    }

    #[test]
    fn test_predict_request() {
        let coordinator = Coordinator::default();
        coordinator.init_model_with(vec![1.0], 0.0).unwrap();
        let response = coordinator.handle(Request::Predict {
            samples: vec![vec![-5.0], vec![5.0]],
        });
        let Response::Predictions { labels, .. } = response else {
            panic!("unexpected response: {:?}", response);
        };
        assert_eq!(labels, vec![0, 1]);
    }
}
