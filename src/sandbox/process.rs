use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;

/// How a child process ended
#[derive(Debug)]
pub(super) enum Exit {
    Completed(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Everything a child wrote before it ended
#[derive(Debug)]
pub(super) struct ChildOutput {
    pub exit: Exit,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ChildOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawns `command` in `dir`, feeds it `input` and collects both output streams
///
/// The child is killed when `limit` elapses or `token` is cancelled; whatever it
/// wrote up to that point is still returned. Only a failure to spawn (or to talk
/// to the child's pipes) is an `Err`.
pub(super) async fn run_child(
    command: &[String],
    dir: &Path,
    input: Option<&[u8]>,
    limit: Duration,
    token: &CancellationToken,
) -> io::Result<ChildOutput> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdin = child.stdin.take();
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let finished = {
        let collect = async {
            let (fed, out, err, status) = tokio::join!(
                feed_stdin(stdin, input),
                stdout.read_to_end(&mut stdout_buf),
                stderr.read_to_end(&mut stderr_buf),
                child.wait(),
            );
            fed.and(out).and(err).and(status)
        };

        tokio::select! {
            status = collect => status.map(Exit::Completed),
            _ = tokio::time::sleep(limit) => Ok(Exit::TimedOut),
            _ = token.cancelled() => Ok(Exit::Cancelled),
        }
    };

    let exit = match finished? {
        Exit::Completed(status) => Exit::Completed(status),
        exit => {
            log::debug!("Killing `{program}`: {exit:?}");
            if let Err(e) = child.kill().await {
                log::warn!("unable to kill `{program}`: {e}");
            }
            exit
        }
    };

    Ok(ChildOutput {
        exit,
        stdout: stdout_buf,
        stderr: stderr_buf,
    })
}

/// Writes the whole input; dropping the pipe afterwards gives the child EOF
async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&[u8]>) -> io::Result<()> {
    let (Some(mut pipe), Some(input)) = (stdin, input) else {
        return Ok(());
    };

    match pipe.write_all(input).await {
        // The child may exit without reading its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}
