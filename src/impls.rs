use std::fmt::Debug;

pub trait LoggableErrorResult<T> {
    fn ok_or_log(self) -> Option<T>;
}

impl<T, E: Debug> LoggableErrorResult<T> for Result<T, E> {
    fn ok_or_log(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{:?}", e);
                None
            }
        }
    }
}
