//! Integration tests for coordinator rounds, driven directly and through
//! the JSON request boundary

mod common;

use ::common::federated::{
    AggregationStrategy, ClientUpdate, Coordinator, CoordinatorError, FederatedSettings, Request,
    Response, RoundState, SettingsError, MAX_SAMPLES_PER_UPDATE,
};

#[tokio::test]
async fn test_fedavg_weights_by_samples() {
    let coordinator = common::coordinator(2, &["a", "b"]);
    coordinator.start_round().unwrap();

    coordinator
        .submit_update(ClientUpdate::new("a", vec![1.0], 1.0, 100))
        .unwrap();
    coordinator
        .submit_update(ClientUpdate::new("b", vec![3.0], 3.0, 300))
        .unwrap();

    let (model, record) = coordinator.aggregate().unwrap();
    assert!((model.weights[0] - 2.5).abs() < 1e-12);
    assert!((model.bias - 2.5).abs() < 1e-12);
    assert_eq!(model.round, 1);
    assert_eq!(record.num_clients, 2);
    assert_eq!(record.total_samples, 400);
    assert_eq!(coordinator.state(), RoundState::Idle);
}

#[tokio::test]
async fn test_fedavg_three_clients() {
    let coordinator = common::coordinator(3, &["a", "b", "c"]);
    coordinator.start_round().unwrap();
    for (id, delta, n) in [("a", 1.0, 1), ("b", 2.0, 1), ("c", 3.0, 2)] {
        coordinator
            .submit_update(ClientUpdate::new(id, vec![delta], 0.0, n))
            .unwrap();
    }

    let (model, _) = coordinator.aggregate().unwrap();
    assert!((model.weights[0] - 2.25).abs() < 1e-12);
}

#[tokio::test]
async fn test_zero_sample_updates_are_ignored() {
    let coordinator = common::coordinator(2, &["a", "b"]);
    coordinator.start_round().unwrap();
    coordinator
        .submit_update(ClientUpdate::new("a", vec![4.0], 0.0, 10))
        .unwrap();
    coordinator
        .submit_update(ClientUpdate::new("b", vec![1000.0], 0.0, 0))
        .unwrap();

    let (model, record) = coordinator.aggregate().unwrap();
    assert!((model.weights[0] - 4.0).abs() < 1e-12);
    assert_eq!(record.num_clients, 1);
}

#[tokio::test]
async fn test_only_zero_sample_updates_keeps_round_open() {
    let coordinator = common::coordinator(1, &["a"]);
    coordinator.start_round().unwrap();
    coordinator
        .submit_update(ClientUpdate::new("a", vec![1.0], 0.0, 0))
        .unwrap();

    assert!(matches!(
        coordinator.aggregate(),
        Err(CoordinatorError::NoUpdates)
    ));
    assert_eq!(coordinator.state(), RoundState::Collecting);
    assert_eq!(coordinator.model().unwrap().round, 0);
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let coordinator = common::coordinator(1, &["a"]);
    coordinator.start_round().unwrap();
    coordinator
        .submit_update(ClientUpdate::new("a", vec![1.0], 0.0, 5))
        .unwrap();

    assert!(matches!(
        coordinator.submit_update(ClientUpdate::new("a", vec![9.0], 0.0, 5)),
        Err(CoordinatorError::DuplicateSubmission(id)) if id == "a"
    ));

    // the first submission is the one that counts
    let (model, _) = coordinator.aggregate().unwrap();
    assert!((model.weights[0] - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_insufficient_clients() {
    let coordinator = common::coordinator(3, &["a", "b"]);
    assert!(matches!(
        coordinator.start_round(),
        Err(CoordinatorError::InsufficientClients {
            required: 3,
            registered: 2
        })
    ));
    assert_eq!(coordinator.state(), RoundState::Idle);

    coordinator.register_client("c");
    coordinator.start_round().unwrap();
}

#[tokio::test]
async fn test_rounds_stop_at_max_rounds() {
    let coordinator = Coordinator::new(FederatedSettings {
        num_features: 1,
        min_clients_for_round: 1,
        max_rounds: 2,
        strategy: AggregationStrategy::Mean,
    })
    .unwrap();
    coordinator.init_model(1).unwrap();
    coordinator.register_client("a");

    for round in 1..=2 {
        coordinator.start_round().unwrap();
        coordinator
            .submit_update(ClientUpdate::new("a", vec![round as f64], 0.0, 1))
            .unwrap();
        coordinator.aggregate().unwrap();
    }

    assert!(matches!(
        coordinator.start_round(),
        Err(CoordinatorError::TrainingComplete(2))
    ));
    assert_eq!(coordinator.history().len(), 2);
}

#[tokio::test]
async fn test_concurrent_submissions_from_tasks() {
    let ids: Vec<String> = (0..16).map(|i| format!("client-{}", i)).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let coordinator = common::coordinator(16, &refs);
    coordinator.start_round().unwrap();

    let mut handles = Vec::new();
    for id in ids.clone() {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.submit_update(ClientUpdate::new(id, vec![2.0], 1.0, 10))
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let (model, record) = coordinator.aggregate().unwrap();
    assert_eq!(record.num_clients, 16);
    assert_eq!(record.total_samples, 160);
    assert!((model.weights[0] - 2.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_json_boundary_round_trip() {
    let coordinator = Coordinator::new(FederatedSettings {
        num_features: 2,
        min_clients_for_round: 2,
        max_rounds: 5,
        strategy: AggregationStrategy::FedAvg,
    })
    .unwrap();

    let send = |json: &str| -> Response {
        let request: Request = serde_json::from_str(json).unwrap();
        coordinator.handle(request)
    };

    assert!(matches!(send(r#"{"op":"init_model"}"#), Response::Model(m) if m.num_features == 2));
    send(r#"{"op":"register","client_id":"hospital-a","metadata":{"ward":"icu"}}"#);
    send(r#"{"op":"register","client_id":"hospital-b"}"#);
    let Response::Clients { clients } = send(r#"{"op":"clients"}"#) else {
        panic!("expected the client list");
    };
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0].metadata["ward"], "icu");
    assert!(matches!(
        send(r#"{"op":"start_round"}"#),
        Response::RoundStarted { round: 1, .. }
    ));
    send(r#"{"op":"submit_update","client_id":"hospital-a","weight_delta":[1.0,0.0],"bias_delta":0.5,"num_samples":100}"#);
    send(r#"{"op":"submit_update","client_id":"hospital-b","weight_delta":[3.0,2.0],"bias_delta":0.5,"num_samples":300,"local_accuracy":0.9}"#);

    let Response::RoundCompleted { record, model } = send(r#"{"op":"aggregate"}"#) else {
        panic!("expected a completed round");
    };
    assert_eq!(record.round, 1);
    assert_eq!(record.avg_local_accuracy, Some(0.9));
    assert!((model.weights[0] - 2.5).abs() < 1e-12);
    assert!((model.weights[1] - 1.5).abs() < 1e-12);

    // errors surface as tagged responses with a stable kind
    let response = send(r#"{"op":"aggregate"}"#);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["kind"], "wrong_state");

    let Response::Predictions { labels, .. } =
        send(r#"{"op":"predict","samples":[[1.0,1.0],[-5.0,-5.0]]}"#)
    else {
        panic!("expected predictions");
    };
    assert_eq!(labels, vec![1, 0]);
}

#[tokio::test]
async fn test_oversized_sample_count_cannot_wedge_round() {
    let coordinator = common::coordinator(1, &["a", "b"]);
    coordinator.start_round().unwrap();

    assert!(matches!(
        coordinator.submit_update(ClientUpdate::new("a", vec![1.0], 0.0, u64::MAX)),
        Err(CoordinatorError::InvalidUpdate { client_id, .. }) if client_id == "a"
    ));
    coordinator
        .submit_update(ClientUpdate::new("b", vec![3.0], 0.0, 10))
        .unwrap();
    assert_eq!(coordinator.state(), RoundState::Collecting);

    let (model, record) = coordinator.aggregate().unwrap();
    assert!((model.weights[0] - 3.0).abs() < 1e-12);
    assert_eq!(record.total_samples, 10);
    assert_eq!(coordinator.state(), RoundState::Idle);

    // the next round runs normally, and so does a reset
    coordinator.start_round().unwrap();
    coordinator
        .submit_update(ClientUpdate::new("a", vec![1.0], 0.0, MAX_SAMPLES_PER_UPDATE))
        .unwrap();
    coordinator
        .submit_update(ClientUpdate::new("b", vec![1.0], 0.0, MAX_SAMPLES_PER_UPDATE))
        .unwrap();
    let (model, record) = coordinator.aggregate().unwrap();
    assert_eq!(model.round, 2);
    assert_eq!(record.total_samples, 2 * MAX_SAMPLES_PER_UPDATE);
    coordinator.reset().unwrap();
}

#[tokio::test]
async fn test_unusable_settings_are_rejected() {
    let settings = FederatedSettings {
        num_features: 1,
        min_clients_for_round: 0,
        max_rounds: 5,
        strategy: AggregationStrategy::FedAvg,
    };
    assert_eq!(
        Coordinator::new(settings.clone()).unwrap_err(),
        SettingsError::NoClients
    );
    let settings = FederatedSettings {
        min_clients_for_round: 1,
        max_rounds: 0,
        ..settings
    };
    assert_eq!(
        Coordinator::new(settings).unwrap_err(),
        SettingsError::NoRounds
    );
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    assert!(serde_json::from_str::<Request>(r#"{"op":"launch_missiles"}"#).is_err());
    assert!(serde_json::from_str::<Request>(r#"{"op":"register"}"#).is_err());
    assert!(serde_json::from_str::<Request>(
        r#"{"op":"submit_update","client_id":"a","weight_delta":"nope","bias_delta":0,"num_samples":1}"#
    )
    .is_err());
}
