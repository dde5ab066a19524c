use std::error::Error;
use std::sync::Arc;

use ioc_kernel::interception::Request;
use ioc_kernel::prelude::*;
use parking_lot::Mutex;

pub trait Logger: Send + Sync {
    fn log(&self, message: String);

    fn lines(&self) -> Vec<String>;
}

#[derive(Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

#[injectable(singleton)]
impl MemoryLogger {
    #[inject]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, message: String) {
        self.lines.lock().push(message);
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

pub trait Metrics: Send + Sync {}

pub trait Handler: Send + Sync {
    fn process(&self, value: i32) -> i32;

    fn summary(&self) -> String;
}

pub struct Server {
    logger: Arc<dyn Logger>,
    metrics: Option<Arc<dyn Metrics>>,
    port: u16,
    banner: Option<String>,
    started_at: Option<Arc<u64>>,
}

#[injectable]
impl Server {
    #[inject]
    pub fn new(
        logger: Arc<dyn Logger>,
        metrics: Option<Arc<dyn Metrics>>,
        #[named("port")] listen_port: u16,
        banner: Option<String>,
    ) -> Self {
        Self {
            logger,
            metrics,
            port: listen_port,
            banner,
            started_at: None,
        }
    }

    #[constructor]
    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        Self::new(logger, None, 0, None)
    }

    #[inject]
    pub fn set_started_at(&mut self, started_at: Arc<u64>) {
        self.started_at = Some(started_at);
    }

    #[start]
    fn start(&self) {
        self.logger.log(format!("listening on {}", self.port));
    }

    #[stop]
    fn stop(&self) -> Result<(), std::io::Error> {
        self.logger.log(String::from("stopping"));
        Ok(())
    }

    #[dispose]
    fn dispose(&self) {
        self.logger.log(String::from("disposed"));
    }

    #[intercept("double", 1)]
    #[intercept("audit", -1)]
    pub fn increment(&self, value: i32) -> i32 {
        value + 1
    }
}

impl Handler for Server {
    fn process(&self, value: i32) -> i32 {
        self.increment(value)
    }

    fn summary(&self) -> String {
        format!(
            "port={} banner={:?} metrics={} started_at={:?}",
            self.port,
            self.banner,
            self.metrics.is_some(),
            self.started_at.as_deref(),
        )
    }
}

struct HandlerProxy {
    inner: Arc<dyn Handler>,
    dispatch: Dispatch,
}

impl Handler for HandlerProxy {
    fn process(&self, value: i32) -> i32 {
        let inner = Arc::clone(&self.inner);
        self.dispatch
            .invoke("increment", vec![Box::new(value)], move |request: &mut Request| {
                let value = request
                    .take_argument::<i32>(0)
                    .ok_or("the argument was taken")?;
                Ok(inner.process(value))
            })
            .unwrap_or(i32::MIN)
    }

    fn summary(&self) -> String {
        self.inner.summary()
    }
}

struct ServerModule {
    audits: Arc<Mutex<Vec<i32>>>,
}

impl Module for ServerModule {
    fn configure(
        &self,
        configurer: &mut dyn Configurer,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let audits = Arc::clone(&self.audits);
        configurer.register_interceptor(
            "audit",
            InterceptorSource::from_fn(move |invocation: &mut Invocation<'_>| {
                if let Some(value) = invocation.request().argument::<i32>(0) {
                    audits.lock().push(*value);
                }
                invocation.proceed()
            }),
        );
        configurer.register_interceptor(
            "double",
            InterceptorSource::from_fn(|invocation: &mut Invocation<'_>| {
                invocation.proceed()?;
                let value = invocation.return_value_as::<i32>().copied().unwrap_or(0);
                invocation.set_return_value(value * 2);
                Ok(())
            }),
        );

        bind::<dyn Logger>()
            .to::<MemoryLogger>(|logger| logger)
            .set_on(configurer);

        bind::<dyn Handler>()
            .to::<Server>(|server| server)
            .in_singleton_scope()
            .with_argument("port", 8080u16)
            .proxy_with(|inner, dispatch| Arc::new(HandlerProxy { inner, dispatch }))
            .set_on(configurer);

        bind::<u64>()
            .to_constant(Arc::new(1_700_000_000))
            .when_target_named("started_at")
            .set_on(configurer);

        Ok(())
    }
}

fn init_kernel() -> (Kernel, Arc<Mutex<Vec<i32>>>) {
    let audits = Arc::new(Mutex::new(Vec::new()));
    let module = ServerModule {
        audits: Arc::clone(&audits),
    };
    (Kernel::init(module).unwrap(), audits)
}

#[test]
fn injectable_describes_constructors_and_members() {
    let descriptor = Server::describe();
    assert_eq!(descriptor.constructors().len(), 2);

    let marked = &descriptor.constructors()[0];
    assert_eq!(marked.name(), "Server::new");
    assert!(marked.has_injection_marker());
    let names: Vec<_> = marked.targets().iter().map(|t| t.name()).collect();
    assert_eq!(names, ["logger", "metrics", "port", "banner"]);
    let optional: Vec<_> = marked.targets().iter().map(|t| t.is_optional()).collect();
    assert_eq!(optional, [false, true, false, true]);
    assert!(!descriptor.constructors()[1].has_injection_marker());

    assert_eq!(descriptor.members().len(), 1);
    assert_eq!(descriptor.members()[0].name(), "set_started_at");
    assert_eq!(descriptor.interceptors().len(), 2);
    assert!(descriptor.lifecycle().is_none());
    assert!(MemoryLogger::describe().lifecycle().is_some());
}

#[test]
fn injectable_attributes_drive_activation() {
    let (kernel, audits) = init_kernel();

    let handler = kernel.get::<dyn Handler>().unwrap();
    assert_eq!(
        handler.summary(),
        "port=8080 banner=None metrics=false started_at=Some(1700000000)",
    );
    assert_eq!(handler.process(20), 42);
    assert_eq!(*audits.lock(), [20]);

    let logger = kernel.get::<dyn Logger>().unwrap();
    assert!(Arc::ptr_eq(&logger, &kernel.get::<dyn Logger>().unwrap()));
    assert_eq!(logger.lines(), ["listening on 8080"]);

    assert!(kernel.release_object(&handler).unwrap());
    assert_eq!(
        logger.lines(),
        ["listening on 8080", "stopping", "disposed"],
    );
}
