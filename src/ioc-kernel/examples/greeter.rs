use std::error::Error;
use std::sync::Arc;

use ioc_kernel::prelude::*;

fn main() {
    let kernel = Kernel::init(AppModule::new("greeter")).unwrap();
    let app = kernel.get::<App>().unwrap();
    app.run();

    let greeter = kernel
        .get_with::<dyn Greeter>(Parameters::new().with("language", "chinese"))
        .unwrap();
    greeter.greet();
}

struct AppModule {
    app_name: &'static str,
}

impl AppModule {
    fn new(app_name: &'static str) -> Self {
        Self { app_name }
    }
}

impl Module for AppModule {
    fn configure(
        &self,
        configurer: &mut dyn Configurer,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        bind::<dyn Logger>()
            .to::<ConsoleLogger>(|logger| logger)
            .with_argument("app_name", self.app_name)
            .set_on(configurer);

        bind::<dyn Greeter>()
            .to::<EnglishGreeter>(|greeter| greeter)
            .in_singleton_scope()
            .set_on(configurer);

        bind::<dyn Greeter>()
            .to::<ChineseGreeter>(|greeter| greeter)
            .when(|request| {
                request.target().is_some_and(|target| target.name() == "chinese")
                    || request
                        .parameters()
                        .get("language")
                        .and_then(|language| language.downcast::<&'static str>())
                        .is_some_and(|language| *language == "chinese")
            })
            .in_singleton_scope()
            .set_on(configurer);

        bind::<App>().to_self().in_singleton_scope().set_on(configurer);

        Ok(())
    }
}

trait Logger: Send + Sync + 'static {
    fn log(&self, message: &str);
}

struct ConsoleLogger {
    app_name: &'static str,
}

#[injectable(singleton)]
impl ConsoleLogger {
    #[inject]
    pub fn new(app_name: &'static str) -> Self {
        Self { app_name }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) {
        eprintln!("[{}] {}", self.app_name, message);
    }
}

trait Greeter: Send + Sync + 'static {
    fn greet(&self);
}

struct EnglishGreeter {
    logger: Arc<dyn Logger>,
}

#[injectable]
impl EnglishGreeter {
    #[inject]
    fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl Greeter for EnglishGreeter {
    fn greet(&self) {
        self.logger.log("Hello World!");
    }
}

struct ChineseGreeter {
    logger: Arc<dyn Logger>,
}

#[injectable]
impl ChineseGreeter {
    #[inject]
    fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl Greeter for ChineseGreeter {
    fn greet(&self) {
        self.logger.log("你好世界!");
    }
}

struct App {
    logger: Arc<dyn Logger>,
    greeters: Vec<Arc<dyn Greeter>>,
}

#[injectable]
impl App {
    #[inject]
    fn new(
        logger: Arc<dyn Logger>,
        english: Arc<dyn Greeter>,
        #[named("chinese")] other: Arc<dyn Greeter>,
    ) -> Self {
        Self {
            logger,
            greeters: vec![english, other],
        }
    }

    fn run(&self) {
        self.logger.log("Greeting from kernel managed objects:");
        for greeter in &self.greeters {
            greeter.greet();
        }
    }

    #[stop]
    fn stop(&self) {
        self.logger.log("Goodbye!");
    }
}
