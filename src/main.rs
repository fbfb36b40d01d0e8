use std::sync::Arc;
use std::thread;

use env_logger;
use log::{
    debug,
    error,
    info,
};
use tiny_http::Server;

use rangeserve::record::FileResourceFactory;
use rangeserve::request::HttpManager;

mod arg;

use arg::Settings;

fn main() {
    env_logger::init();

    let settings = Settings::from_args();
    let base_path = match settings.dir.canonicalize() {
        Ok(v) => v,
        Err(e) => {
            error!("content directory {:?} not usable: {}", settings.dir, e);
            return;
        },
    };

    let factory = FileResourceFactory::new(&base_path, settings.max_age);
    let manager = Arc::new(HttpManager::new(Box::new(factory), settings.response_config()));

    let srv = match Server::http((settings.host.as_str(), settings.port)) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot bind {}:{}: {}", settings.host, settings.port, e);
            return;
        },
    };
    info!("serving {:?} on {}:{}", base_path, settings.host, settings.port);

    loop {
        let req = match srv.recv() {
            Ok(v) => v,
            Err(e) => {
                error!("{}", e);
                break;
            },
        };
        debug!("request from {:?}", req.remote_addr());

        let m = manager.clone();
        thread::spawn(move || {
            m.respond(req);
        });
    }
}
