pub(super) const ROOT_LONG_ABOUT: &str = "\
Run shell commands periodically and report changes in their output

Dachs is meant to be started from cron (or a systemd timer). Each invocation
runs the configured commands that are due, compares their standard output with
the output recorded on the previous successful run, and prints a unified diff
for every command whose output changed. Commands that did not change print
nothing, so cron only sends mail when there is something to look at.

CONFIGURATION:

  The config file is TOML. Without -c/--config (or DACHS_CONFIG), dachs.conf
  is looked up in $XDG_CONFIG_HOME (default ~/.config), then in each entry of
  $XDG_CONFIG_DIRS (default /etc/xdg).

    interval  = 3600          # seconds between runs (default 3600)
    state_dir = \"/var/lib/dachs\"
    differ    = \"git\"         # git, diff or builtin

    [[command]]
    name     = \"listening sockets\"
    run      = \"ss -tln\"
    interval = 600            # per-command override; 0 runs every time
    timeout  = 30             # kill the command after this many seconds

STATE:

  The last output of each command is stored in the state directory in a file
  named after the SHA-256 of the command text. Its modification time records
  when the command last ran successfully. A command that fails keeps its
  previous output as the baseline. Two commands with identical text share
  one state file.

  The state directory defaults to $XDG_STATE_HOME/dachs
  (~/.local/state/dachs) and is created if missing.

EXIT STATUS:

  0    every command succeeded or was not due
  1    at least one command failed (all commands were still attempted)
  255  the configuration could not be loaded or the state directory opened
";
