mod common;

use common::{spike_table, temp_dir};
use regime_engine::application::ml::GaussianRegimeModel;
use regime_engine::application::regimes::RollingRegimeInference;
use regime_engine::domain::config::{CovarianceType, ModelConfig, RollingConfig};
use regime_engine::domain::errors::SnapshotError;
use regime_engine::domain::ml::feature_registry::FeatureSchema;
use regime_engine::infrastructure::persistence::ModelStore;

fn fitted_model(covariance_type: CovarianceType, n_pca_components: Option<usize>) -> GaussianRegimeModel {
    let table = spike_table(240, 21);
    let config = ModelConfig {
        n_components: 2,
        covariance_type,
        n_pca_components,
        ..ModelConfig::default()
    };
    let mut model = GaussianRegimeModel::new(config).with_feature_names(table.columns().to_vec());
    model.fit(table.values()).expect("fit succeeds");
    model
}

#[test]
fn test_saved_model_reproduces_predictions() {
    let dir = temp_dir("regime_persist");
    let holdout = spike_table(120, 99);

    for (covariance_type, pca) in [
        (CovarianceType::Full, None),
        (CovarianceType::Diag, Some(1)),
        (CovarianceType::Spherical, Some(2)),
        (CovarianceType::Tied, None),
    ] {
        let model = fitted_model(covariance_type, pca);
        let store = ModelStore::new(dir.join(format!("{}.json", covariance_type)));
        store.save_model(&model).expect("save succeeds");
        let restored = store.load_model().expect("load succeeds");

        assert_eq!(restored.config(), model.config());
        assert_eq!(restored.feature_names(), model.feature_names());
        assert_eq!(
            restored.predict(holdout.values()).unwrap(),
            model.predict(holdout.values()).unwrap()
        );
        assert_eq!(
            restored.predict_proba(holdout.values()).unwrap(),
            model.predict_proba(holdout.values()).unwrap()
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_final_driver_model_can_be_saved() {
    let dir = temp_dir("regime_driver_model");
    let table = spike_table(120, 4);
    let driver = RollingRegimeInference::new(
        ModelConfig {
            n_components: 2,
            ..ModelConfig::default()
        },
        RollingConfig {
            window: 48,
            refit_interval: 10,
            verbose: false,
            ..RollingConfig::default()
        },
    )
    .unwrap();
    let run = driver.run(&table).unwrap();
    let model = run.model.expect("at least one fit succeeded");
    assert!(run.permutation.is_some());

    let store = ModelStore::new(dir.join("model.json"));
    store.save_model(&model).unwrap();
    let restored = store.load_model().unwrap();

    // Feature order recorded at training time realigns a reordered table
    let schema = FeatureSchema::new(restored.feature_names().to_vec());
    let reordered = table.select(&["vol", "ret"]).unwrap();
    let aligned = schema.align(&reordered).unwrap();
    assert_eq!(aligned.values(), table.values());
    assert_eq!(
        restored.predict(aligned.values()).unwrap(),
        model.predict(table.values()).unwrap()
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_and_corrupt_files() {
    let dir = temp_dir("regime_corrupt");

    let missing = ModelStore::new(dir.join("absent.json"));
    assert!(!missing.exists());
    assert!(matches!(missing.load(), Err(SnapshotError::NotFound { .. })));

    let path = dir.join("corrupt.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        ModelStore::new(path.clone()).load(),
        Err(SnapshotError::Json(_))
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_unfitted_model_cannot_be_saved() {
    let dir = temp_dir("regime_unfitted");
    let store = ModelStore::new(dir.join("model.json"));
    let result = store.save_model(&GaussianRegimeModel::new(ModelConfig::default()));
    assert!(matches!(result, Err(SnapshotError::Model(_))));
    assert!(!store.exists());
    let _ = std::fs::remove_dir_all(&dir);
}
