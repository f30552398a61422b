use stampede::prelude::*;

#[tokio::main]
async fn main() {
    let result = async {
        Stampede::initialize()?
            .register_iteration(SyncProducts)
            .set_default(StampedeDefault::Users, SyncProducts::USERS)?
            .set_default(StampedeDefault::RunTime, SyncProducts::RUN_TIME)?
            .execute()
            .await
    }
    .await;

    // Failed checks are reported in the metrics, only a failure to run is an error.
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
